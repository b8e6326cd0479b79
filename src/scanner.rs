//! Opportunity Scanner — searches for statistical, triangular, and
//! multi-hop arbitrage opportunities and ranks the candidates it finds.
//!
//! Iterates token pairs across however many routing sources the Aggregator
//! Client reports, quoting both directions and keeping anything above a
//! minimum spread, extended from a single spread check to three opportunity
//! kinds (statistical, triangular, multi-hop).

use crate::accountant::Accountant;
use crate::aggregator::AggregatorClient;
use crate::gas_oracle::{Complexity, GasOracle, Urgency};
use crate::token_registry::TokenRegistry;
use crate::types::{now_secs, Hop, Opportunity, OpportunityKind, RoutingSource, ZScoreSnapshot};
use crate::zscore::{Signal, ZScoreEngine};
use alloy::primitives::{Address, U256};

/// Hard notional cap for any single opportunity's input amount, in USD,
/// regardless of how large the statistical deviation scales it.
const NOTIONAL_CAP_USD: f64 = 10_000.0;

/// Minimum profit, as a percentage of notional, for a candidate to survive
/// validation.
const MIN_PROFIT_PERCENT: f64 = 0.05;

const MAX_NEIGHBOR_BRANCHING: usize = 5;
const MAX_CHECKED_PATHS: usize = 100;
const MULTI_HOP_RERANK_TOP_N: usize = 10;

pub struct Scanner<'a> {
    registry: &'a TokenRegistry,
    aggregator: &'a AggregatorClient,
    zscore: &'a ZScoreEngine,
    accountant: &'a Accountant<'a>,
    gas_oracle: &'a GasOracle,
    max_hops: usize,
    gas_token_price_usd: f64,
}

struct MultiHopCandidate {
    hops: Vec<Hop>,
    raw_profit_usd: f64,
}

impl<'a> Scanner<'a> {
    pub fn new(
        registry: &'a TokenRegistry,
        aggregator: &'a AggregatorClient,
        zscore: &'a ZScoreEngine,
        accountant: &'a Accountant<'a>,
        gas_oracle: &'a GasOracle,
        max_hops: usize,
        gas_token_price_usd: f64,
    ) -> Self {
        Self {
            registry,
            aggregator,
            zscore,
            accountant,
            gas_oracle,
            max_hops,
            gas_token_price_usd,
        }
    }

    /// One full scan cycle: statistical pairs, then triangular cycles through
    /// base tokens, then deeper multi-hop cycles up to `max_hops`. Returns
    /// candidates sorted best-first by rank score.
    pub async fn scan(&self, pairs: &[(Address, Address)]) -> Vec<Opportunity> {
        let mut found = Vec::new();
        for (a, b) in pairs {
            if let Some(opp) = self.scan_statistical_pair(*a, *b).await {
                found.push(opp);
            }
        }
        for base in self.registry.base_tokens() {
            for alt in self.registry.top_alt_tokens_by_liquidity(20, 50_000.0) {
                if let Some(opp) = self.scan_triangular(base.address, alt.address).await {
                    found.push(opp);
                }
            }
        }
        if self.max_hops >= 3 {
            for base in self.registry.base_tokens() {
                found.extend(self.scan_multi_hop(base.address).await);
            }
        }

        found.retain(|o| self.validate(o));
        found.sort_by(|a, b| {
            self.score(b)
                .partial_cmp(&self.score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        found
    }

    fn hop_liquidity_usd(&self, hop: &Hop) -> f64 {
        let from_liq = self.registry.get(&hop.from_token).map(|t| t.last_liquidity_usd);
        let to_liq = self.registry.get(&hop.to_token).map(|t| t.last_liquidity_usd);
        match (from_liq, to_liq) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => 0.0,
        }
    }

    fn profit_percent(&self, opportunity: &Opportunity) -> f64 {
        let Some(from) = opportunity.flash_loan_asset() else {
            return 0.0;
        };
        let Some(token) = self.registry.get(&from) else {
            return 0.0;
        };
        let input_usd = token_amount_to_usd(opportunity.input_amount, token.last_price_usd, token.decimals);
        if input_usd <= 0.0 {
            return 0.0;
        }
        (opportunity.expected_gross_profit_usd / input_usd) * 100.0
    }

    /// Ranking score: `10*profitPercent + 5*|z| (+ conviction bonus) +
    /// 5*log10(path liquidity) - 100*price impact`. Conviction bonus rewards
    /// a strongly mean-reverting signal on top of its raw magnitude.
    fn score(&self, opportunity: &Opportunity) -> f64 {
        let profit_percent_term = 10.0 * self.profit_percent(opportunity);

        let z_term = opportunity
            .z_score
            .map(|z| {
                let conviction_bonus = if z.z.abs() >= 3.0 {
                    20.0
                } else if z.z.abs() >= 2.0 {
                    10.0
                } else {
                    0.0
                };
                5.0 * z.z.abs() + conviction_bonus
            })
            .unwrap_or(0.0);

        let path_liquidity_usd: f64 = opportunity.hops.iter().map(|h| self.hop_liquidity_usd(h)).sum();
        let liquidity_term = 5.0 * path_liquidity_usd.max(1.0).log10();

        let impact_term: f64 = 100.0 * opportunity.hops.iter().map(|h| h.price_impact).sum::<f64>();

        profit_percent_term + z_term + liquidity_term - impact_term
    }

    fn validate(&self, opportunity: &Opportunity) -> bool {
        if opportunity.hops.is_empty() || opportunity.hops.len() > self.max_hops {
            return false;
        }
        if !opportunity.is_closed_cycle() {
            return false;
        }
        if opportunity.is_expired(now_secs()) {
            return false;
        }
        let hops_ok = opportunity
            .hops
            .iter()
            .all(|h| h.validate(1e18).is_ok() && self.registry.is_safe(&h.from_token) && self.registry.is_safe(&h.to_token));
        if !hops_ok {
            return false;
        }
        if self.profit_percent(opportunity) <= MIN_PROFIT_PERCENT {
            return false;
        }

        let per_call_gas_units: u64 = opportunity.hops.iter().map(|h| h.gas_estimate).sum();
        let gas = self
            .gas_oracle
            .optimal_gas_parameters(per_call_gas_units, Complexity::FlashLoan, Urgency::Normal);
        let flash_loan_notional_usd = Accountant::flash_loan_notional_usd(opportunity);
        self.accountant
            .simulate(opportunity, gas, self.gas_token_price_usd, flash_loan_notional_usd)
            .success
    }

    async fn best_hop(&self, from: Address, to: Address, amount_in: U256) -> Option<Hop> {
        let quote = self.aggregator.best_quote(from, to, amount_in).await?;
        Some(Hop {
            from_token: from,
            to_token: to,
            amount_in,
            min_amount_out: quote.amount_out.saturating_mul(U256::from(995u64)) / U256::from(1000u64),
            source: quote.source,
            routing_payload: quote.routing_payload,
            gas_estimate: quote.gas_estimate,
            price_impact: quote.price_impact,
        })
    }

    /// Statistical search: when the Z-Score Engine signals a deviation on a
    /// cointegrated pair, build a two-hop round trip sized by the
    /// deviation's confidence, capped at the notional ceiling.
    async fn scan_statistical_pair(&self, token_a: Address, token_b: Address) -> Option<Opportunity> {
        let signal = self.zscore.signal(token_a, token_b)?;
        if matches!(signal.signal, Signal::Hold) {
            return None;
        }
        let (from, to) = match signal.signal {
            Signal::ShortALongB => (token_a, token_b),
            Signal::LongAShortB => (token_b, token_a),
            _ => return None,
        };

        let token = self.registry.get(&from)?;
        let size_usd = (signal.confidence * NOTIONAL_CAP_USD).min(NOTIONAL_CAP_USD).max(10.0);
        let amount_in = usd_to_token_amount(size_usd, token.last_price_usd, token.decimals)?;

        let out_hop = self.best_hop(from, to, amount_in).await?;
        let return_hop = self.best_hop(to, from, out_hop.min_amount_out).await?;

        let expected_output = return_hop.min_amount_out;
        let to_token = self.registry.get(&to)?;
        let gross_profit_usd = token_amount_to_usd(
            expected_output.saturating_sub(amount_in),
            token.last_price_usd,
            token.decimals,
        )
        .max(token_amount_to_usd(
            U256::ZERO,
            to_token.last_price_usd,
            to_token.decimals,
        ));

        Some(Opportunity {
            kind: OpportunityKind::Statistical,
            hops: vec![out_hop, return_hop],
            input_amount: amount_in,
            expected_output,
            expected_gross_profit_usd: gross_profit_usd,
            deadline: now_secs() + 20,
            z_score: Some(ZScoreSnapshot {
                z: signal.z,
                confidence: signal.confidence,
                half_life: signal.half_life,
                hurst_exponent: signal.hurst_exponent,
            }),
            created_at: now_secs(),
        })
    }

    /// Triangular search: `base -> alt -> base` via the best available
    /// routes on each leg.
    async fn scan_triangular(&self, base: Address, alt: Address) -> Option<Opportunity> {
        let base_token = self.registry.get(&base)?;
        let amount_in = usd_to_token_amount(1_000.0, base_token.last_price_usd, base_token.decimals)?;

        let out_hop = self.best_hop(base, alt, amount_in).await?;
        let return_hop = self.best_hop(alt, base, out_hop.min_amount_out).await?;

        if return_hop.min_amount_out <= amount_in {
            return None;
        }
        let profit_usd = token_amount_to_usd(
            return_hop.min_amount_out - amount_in,
            base_token.last_price_usd,
            base_token.decimals,
        );

        let expected_output = return_hop.min_amount_out;
        Some(Opportunity {
            kind: OpportunityKind::Triangular,
            hops: vec![out_hop, return_hop],
            input_amount: amount_in,
            expected_output,
            expected_gross_profit_usd: profit_usd,
            deadline: now_secs() + 20,
            z_score: None,
            created_at: now_secs(),
        })
    }

    /// Multi-hop search: a bounded DFS from `base` back to itself, capped at
    /// `MAX_NEIGHBOR_BRANCHING` candidate edges per node and
    /// `MAX_CHECKED_PATHS` quoted edges overall. The top
    /// `MULTI_HOP_RERANK_TOP_N` closed cycles by raw (pre-accounting) profit
    /// are re-quoted fresh before being returned as candidates.
    async fn scan_multi_hop(&self, base: Address) -> Vec<Opportunity> {
        let Some(base_token) = self.registry.get(&base) else {
            return Vec::new();
        };
        let Some(amount_in) = usd_to_token_amount(1_000.0, base_token.last_price_usd, base_token.decimals) else {
            return Vec::new();
        };
        let neighbors: Vec<Address> = self
            .registry
            .top_alt_tokens_by_liquidity(MAX_NEIGHBOR_BRANCHING * 2, 50_000.0)
            .into_iter()
            .map(|t| t.address)
            .collect();

        let mut stack: Vec<(Address, U256, Vec<Hop>)> = vec![(base, amount_in, Vec::new())];
        let mut checked = 0usize;
        let mut candidates: Vec<MultiHopCandidate> = Vec::new();

        while let Some((current, current_amount, hops)) = stack.pop() {
            if checked >= MAX_CHECKED_PATHS || hops.len() >= self.max_hops {
                continue;
            }

            let mut next_tokens: Vec<Address> = neighbors
                .iter()
                .copied()
                .filter(|t| *t != current && !hops.iter().any(|h| h.from_token == *t))
                .collect();
            if hops.len() >= 2 {
                next_tokens.push(base);
            }

            for next in next_tokens.into_iter().take(MAX_NEIGHBOR_BRANCHING) {
                if checked >= MAX_CHECKED_PATHS {
                    break;
                }
                checked += 1;
                let Some(hop) = self.best_hop(current, next, current_amount).await else {
                    continue;
                };
                let next_amount = hop.min_amount_out;
                let mut path_hops = hops.clone();
                path_hops.push(hop);

                if next == base {
                    let raw_profit_usd = token_amount_to_usd(
                        next_amount.saturating_sub(amount_in),
                        base_token.last_price_usd,
                        base_token.decimals,
                    );
                    candidates.push(MultiHopCandidate {
                        hops: path_hops,
                        raw_profit_usd,
                    });
                } else {
                    stack.push((next, next_amount, path_hops));
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.raw_profit_usd
                .partial_cmp(&a.raw_profit_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(MULTI_HOP_RERANK_TOP_N);

        let mut opportunities = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut repriced = Vec::with_capacity(candidate.hops.len());
            let mut amount = amount_in;
            let mut ok = true;
            for hop in &candidate.hops {
                match self.best_hop(hop.from_token, hop.to_token, amount).await {
                    Some(fresh) => {
                        amount = fresh.min_amount_out;
                        repriced.push(fresh);
                    }
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok || repriced.is_empty() || amount <= amount_in {
                continue;
            }
            let profit_usd = token_amount_to_usd(amount - amount_in, base_token.last_price_usd, base_token.decimals);
            opportunities.push(Opportunity {
                kind: OpportunityKind::MultiHop,
                hops: repriced,
                input_amount: amount_in,
                expected_output: amount,
                expected_gross_profit_usd: profit_usd,
                deadline: now_secs() + 20,
                z_score: None,
                created_at: now_secs(),
            });
        }
        opportunities
    }
}

fn usd_to_token_amount(usd: f64, price_usd: f64, decimals: u8) -> Option<U256> {
    if price_usd <= 0.0 {
        return None;
    }
    let tokens = usd / price_usd;
    let scaled = tokens * 10f64.powi(decimals as i32);
    if !scaled.is_finite() || scaled < 0.0 {
        return None;
    }
    Some(U256::from(scaled as u128))
}

fn token_amount_to_usd(amount: U256, price_usd: f64, decimals: u8) -> f64 {
    let tokens = amount.to::<u128>() as f64 / 10f64.powi(decimals as i32);
    tokens * price_usd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_to_token_amount_roundtrips_approximately() {
        let amount = usd_to_token_amount(100.0, 2.0, 18).unwrap();
        let back = token_amount_to_usd(amount, 2.0, 18);
        assert!((back - 100.0).abs() < 0.01);
    }

    #[test]
    fn usd_to_token_amount_rejects_zero_price() {
        assert!(usd_to_token_amount(100.0, 0.0, 18).is_none());
    }
}
