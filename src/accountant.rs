//! Profit Accountant — resolves USD prices, totals gas/flash-loan/slippage
//! costs, and decides whether an opportunity clears the configured profit
//! threshold before it's ever broadcast.
//!
//! USD-facing values are `Decimal`; on-chain amounts stay integer.

use crate::error::EngineError;
use crate::gas_oracle::GasParameters;
use crate::token_registry::TokenRegistry;
use crate::types::{Opportunity, RoutingSource};
use rust_decimal::Decimal;

/// Global slippage buffer applied after per-hop slippage is summed, per the
/// binding open-question resolution: per-hop slippage first, then a 1.5x
/// global multiplier.
const GLOBAL_SLIPPAGE_BUFFER: f64 = 1.5;

/// Safety multiplier applied to the gas cost estimate before it's subtracted
/// from gross profit.
const GAS_SAFETY_BUFFER: f64 = 1.5;

/// Fixed overhead, in gas units, for the flash-loan borrow/repay leg that
/// wraps every hop.
const FLASH_LOAN_GAS_OVERHEAD: u64 = 250_000;

/// Base transaction gas units, on top of hop gas and the flash-loan overhead.
const BASE_TX_GAS_UNITS: u64 = 21_000;

const MIN_SLIPPAGE_RATE: f64 = 1e-4;
const MAX_SLIPPAGE_RATE: f64 = 0.1;

/// Per-source baseline slippage rate before the liquidity/amount/volatility
/// factors are applied. HTTP aggregators route across multiple pools and
/// carry a lower base than a single direct-DEX pool.
fn base_slippage_rate(source: RoutingSource) -> f64 {
    match source {
        RoutingSource::UniswapV3 => 0.0005,
        RoutingSource::SushiV3 => 0.0006,
        RoutingSource::QuickswapV3Algebra => 0.0006,
        RoutingSource::QuickswapV2 => 0.0010,
        RoutingSource::OneInch => 0.0004,
        RoutingSource::Paraswap => 0.0004,
        RoutingSource::Odos => 0.0004,
    }
}

/// Thinner pools slip more for the same trade size.
fn liquidity_factor(liquidity_usd: f64) -> f64 {
    if liquidity_usd >= 1_000_000.0 {
        1.0
    } else if liquidity_usd >= 500_000.0 {
        1.2
    } else if liquidity_usd >= 100_000.0 {
        1.5
    } else if liquidity_usd >= 50_000.0 {
        2.0
    } else {
        3.0
    }
}

/// Larger trades move the price more, independent of pool depth.
fn amount_factor(trade_usd: f64) -> f64 {
    if trade_usd <= 1_000.0 {
        1.0
    } else if trade_usd <= 10_000.0 {
        1.15
    } else if trade_usd <= 50_000.0 {
        1.35
    } else {
        1.6
    }
}

/// Volatile pairs slip more than stable ones for the same depth and size.
fn volatility_factor(return_stddev: f64) -> f64 {
    if return_stddev <= 0.005 {
        1.0
    } else if return_stddev <= 0.01 {
        1.2
    } else if return_stddev <= 0.02 {
        1.5
    } else {
        1.8
    }
}

/// Estimate the slippage rate for a trade of `trade_usd` against a pool with
/// `liquidity_usd` of depth, holding source and volatility at their most
/// conservative direct-DEX baseline. Non-increasing in `liquidity_usd` for a
/// fixed `trade_usd`.
pub fn estimate_slippage_for_liquidity(trade_usd: f64, liquidity_usd: f64) -> f64 {
    let rate = base_slippage_rate(RoutingSource::QuickswapV2)
        * liquidity_factor(liquidity_usd)
        * amount_factor(trade_usd);
    rate.clamp(MIN_SLIPPAGE_RATE, MAX_SLIPPAGE_RATE)
}

#[derive(Debug, Clone, Copy)]
pub struct ProfitBreakdown {
    pub gross_usd: f64,
    pub gas_cost_usd: f64,
    pub flash_loan_premium_usd: f64,
    pub slippage_usd: f64,
    pub net_usd: f64,
    pub net_percent: f64,
    pub meets_threshold: bool,
}

/// Result of simulating an opportunity before it's broadcast. A local
/// simulation reuses gas estimation and the expected-profit computation; a
/// remote symbolic simulator would replace it when credentials are
/// configured, but that integration lives outside this crate.
#[derive(Debug, Clone, Copy)]
pub struct SimulationResult {
    pub net_profit_usd: f64,
    pub success: bool,
}

pub struct Accountant<'a> {
    registry: &'a TokenRegistry,
    flash_loan_premium_bps: u32,
    min_profit_threshold_usd: f64,
}

impl<'a> Accountant<'a> {
    pub fn new(
        registry: &'a TokenRegistry,
        flash_loan_premium_bps: u32,
        min_profit_threshold_usd: f64,
    ) -> Self {
        Self {
            registry,
            flash_loan_premium_bps,
            min_profit_threshold_usd,
        }
    }

    /// Notional USD size of a hop's input leg.
    fn hop_notional_usd(&self, hop: &crate::types::Hop) -> f64 {
        self.registry
            .get(&hop.from_token)
            .map(|t| {
                let amount = hop.amount_in.to::<u128>() as f64 / 10f64.powi(t.decimals as i32);
                amount * t.last_price_usd
            })
            .unwrap_or(0.0)
    }

    /// Proxy for the thin side of the pool a hop routes through: the lower
    /// of the two legs' tracked aggregate liquidity.
    fn hop_liquidity_usd(&self, hop: &crate::types::Hop) -> f64 {
        let from_liq = self.registry.get(&hop.from_token).map(|t| t.last_liquidity_usd);
        let to_liq = self.registry.get(&hop.to_token).map(|t| t.last_liquidity_usd);
        match (from_liq, to_liq) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => 0.0,
        }
    }

    /// Approximate recent-return volatility from token stability flags,
    /// since per-pair return history isn't tracked by the registry.
    fn hop_return_stddev(&self, hop: &crate::types::Hop) -> f64 {
        let from_stable = self.registry.get(&hop.from_token).map(|t| t.is_stable).unwrap_or(false);
        let to_stable = self.registry.get(&hop.to_token).map(|t| t.is_stable).unwrap_or(false);
        match (from_stable, to_stable) {
            (true, true) => 0.002,
            (true, false) | (false, true) => 0.01,
            (false, false) => 0.025,
        }
    }

    /// Per-hop slippage in USD: a source-specific base rate scaled by
    /// piecewise liquidity, trade-size, and volatility factors, clamped per
    /// hop, summed across the path, and scaled by the global buffer.
    fn per_hop_slippage_usd(&self, opportunity: &Opportunity) -> f64 {
        let mut total = 0.0;
        for hop in &opportunity.hops {
            let notional_usd = self.hop_notional_usd(hop);
            let liquidity_usd = self.hop_liquidity_usd(hop);
            let return_stddev = self.hop_return_stddev(hop);
            let rate = (base_slippage_rate(hop.source)
                * liquidity_factor(liquidity_usd)
                * amount_factor(notional_usd)
                * volatility_factor(return_stddev))
            .clamp(MIN_SLIPPAGE_RATE, MAX_SLIPPAGE_RATE);
            total += notional_usd * rate;
        }
        total
    }

    fn gas_cost_usd(&self, opportunity: &Opportunity, gas: GasParameters, eth_price_usd: f64) -> f64 {
        let hop_gas_units: u64 = opportunity.hops.iter().map(|h| h.gas_estimate).sum();
        let total_gas_units = BASE_TX_GAS_UNITS + hop_gas_units + FLASH_LOAN_GAS_OVERHEAD;
        let gas_price_gwei = gas.max_fee_per_gas_gwei * GAS_SAFETY_BUFFER;
        let cost_eth = (total_gas_units as f64) * gas_price_gwei * 1e-9;
        cost_eth * eth_price_usd
    }

    fn flash_loan_premium_usd(&self, notional_usd: f64) -> f64 {
        notional_usd * (self.flash_loan_premium_bps as f64) / 10_000.0
    }

    /// Heuristic flash-loan notional: the opportunity scaled up by a fixed
    /// leverage factor, floored at zero.
    pub fn flash_loan_notional_usd(opportunity: &Opportunity) -> f64 {
        opportunity.expected_gross_profit_usd.max(0.0) * 10.0
    }

    /// Compute the full breakdown for an opportunity, given current gas
    /// parameters and the gas token's USD price.
    pub fn account(
        &self,
        opportunity: &Opportunity,
        gas: GasParameters,
        gas_token_price_usd: f64,
        flash_loan_notional_usd: f64,
    ) -> ProfitBreakdown {
        let gross_usd = opportunity.expected_gross_profit_usd;
        let gas_cost_usd = self.gas_cost_usd(opportunity, gas, gas_token_price_usd);
        let flash_loan_premium_usd = self.flash_loan_premium_usd(flash_loan_notional_usd);
        let slippage_usd = self.per_hop_slippage_usd(opportunity) * GLOBAL_SLIPPAGE_BUFFER;
        let net_usd = gross_usd - gas_cost_usd - flash_loan_premium_usd - slippage_usd;
        let net_percent = if gross_usd.abs() > f64::EPSILON {
            net_usd / gross_usd * 100.0
        } else {
            0.0
        };
        let meets_threshold = net_usd >= self.min_profit_threshold_usd;

        ProfitBreakdown {
            gross_usd,
            gas_cost_usd,
            flash_loan_premium_usd,
            slippage_usd,
            net_usd,
            net_percent,
            meets_threshold,
        }
    }

    /// Local simulation: reuse gas estimation and the expected-profit
    /// computation to decide whether an opportunity would clear a positive
    /// net profit. A remote symbolic simulator takes over when credentials
    /// are configured; that path isn't wired up here.
    pub fn simulate(
        &self,
        opportunity: &Opportunity,
        gas: GasParameters,
        gas_token_price_usd: f64,
        flash_loan_notional_usd: f64,
    ) -> SimulationResult {
        let breakdown = self.account(opportunity, gas, gas_token_price_usd, flash_loan_notional_usd);
        SimulationResult {
            net_profit_usd: breakdown.net_usd,
            success: breakdown.net_usd > 0.0,
        }
    }

    /// Enforces the `ProfitBelowThreshold` veto.
    pub fn check_threshold(&self, breakdown: &ProfitBreakdown) -> Result<(), EngineError> {
        if !breakdown.meets_threshold {
            return Err(EngineError::ProfitBelowThreshold {
                net: breakdown.net_usd,
                min: self.min_profit_threshold_usd,
            });
        }
        Ok(())
    }

    /// Render net profit as a `Decimal` for display/alerting purposes — USD-
    /// facing values only, never fed back into on-chain amounts.
    pub fn net_profit_decimal(breakdown: &ProfitBreakdown) -> Decimal {
        Decimal::from_f64_retain(breakdown.net_usd).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_registry::ScamFilterMode;
    use crate::types::{now_secs, Hop, OpportunityKind, RoutingSource, Token};
    use alloy::primitives::{Address, U256};
    use rust_decimal_macros::dec;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn hop(from: Address, to: Address, impact: f64) -> Hop {
        Hop {
            from_token: from,
            to_token: to,
            amount_in: U256::from(1_000_000_000_000_000_000u128),
            min_amount_out: U256::from(1u64),
            source: RoutingSource::UniswapV3,
            routing_payload: vec![],
            gas_estimate: 150_000,
            price_impact: impact,
        }
    }

    fn opportunity(hops: Vec<Hop>, gross: f64) -> Opportunity {
        Opportunity {
            kind: OpportunityKind::Triangular,
            hops,
            input_amount: U256::from(1u64),
            expected_output: U256::from(1u64),
            expected_gross_profit_usd: gross,
            deadline: now_secs() + 30,
            z_score: None,
            created_at: now_secs(),
        }
    }

    #[test]
    fn threshold_rejects_thin_margin() {
        let registry = TokenRegistry::new(ScamFilterMode::Advisory);
        let accountant = Accountant::new(&registry, 9, 5.0);
        let breakdown = ProfitBreakdown {
            gross_usd: 10.0,
            gas_cost_usd: 8.0,
            flash_loan_premium_usd: 1.0,
            slippage_usd: 2.0,
            net_usd: -1.0,
            net_percent: -10.0,
            meets_threshold: false,
        };
        assert!(accountant.check_threshold(&breakdown).is_err());
    }

    #[test]
    fn gas_cost_includes_base_and_flash_loan_overhead() {
        let registry = TokenRegistry::new(ScamFilterMode::Advisory);
        let accountant = Accountant::new(&registry, 9, 5.0);
        let opp = opportunity(vec![hop(addr(1), addr(2), 0.001)], 100.0);
        let gas = GasParameters {
            max_fee_per_gas_gwei: 10.0,
            max_priority_fee_per_gas_gwei: 1.0,
            gas_limit: 400_000,
        };
        let breakdown = accountant.account(&opp, gas, 3000.0, 1000.0);
        // (21_000 base + 150_000 hop + 250_000 flash-loan) gas * 10 gwei * 1.5 buffer * 1e-9 * $3000/eth
        let expected = (21_000.0 + 150_000.0 + 250_000.0) * 10.0 * 1.5 * 1e-9 * 3000.0;
        assert!((breakdown.gas_cost_usd - expected).abs() < 1e-6);
    }

    #[test]
    fn slippage_scales_with_liquidity_amount_and_global_buffer() {
        let registry = TokenRegistry::new(ScamFilterMode::Advisory);
        let mut from_token = Token::new(addr(1), "WETH", 18);
        from_token.last_price_usd = 3000.0;
        from_token.last_liquidity_usd = 2_000_000.0;
        registry.upsert(from_token);
        let mut to_token = Token::new(addr(2), "USDC", 6);
        to_token.is_stable = true;
        to_token.last_liquidity_usd = 2_000_000.0;
        registry.upsert(to_token);

        let accountant = Accountant::new(&registry, 0, 5.0);
        let opp = opportunity(vec![hop(addr(1), addr(2), 0.01)], 100.0);
        let gas = GasParameters {
            max_fee_per_gas_gwei: 0.0,
            max_priority_fee_per_gas_gwei: 0.0,
            gas_limit: 300_000,
        };
        let breakdown = accountant.account(&opp, gas, 3000.0, 0.0);
        // notional = 1 ETH * $3000, deep liquidity on both legs, one stable leg.
        let notional_usd = 3000.0;
        let rate = base_slippage_rate(RoutingSource::UniswapV3)
            * liquidity_factor(2_000_000.0)
            * amount_factor(notional_usd)
            * volatility_factor(0.01);
        let expected = notional_usd * rate.clamp(MIN_SLIPPAGE_RATE, MAX_SLIPPAGE_RATE) * GLOBAL_SLIPPAGE_BUFFER;
        assert!((breakdown.slippage_usd - expected).abs() < 1e-6);
    }

    #[test]
    fn estimate_slippage_for_liquidity_is_non_increasing_in_liquidity() {
        let trade_usd = 5_000.0;
        let thin = estimate_slippage_for_liquidity(trade_usd, 20_000.0);
        let medium = estimate_slippage_for_liquidity(trade_usd, 200_000.0);
        let deep = estimate_slippage_for_liquidity(trade_usd, 5_000_000.0);
        assert!(thin >= medium);
        assert!(medium >= deep);
    }

    #[test]
    fn simulate_succeeds_only_on_strictly_positive_net_profit() {
        let registry = TokenRegistry::new(ScamFilterMode::Advisory);
        let accountant = Accountant::new(&registry, 9, 0.0);
        let profitable = opportunity(vec![hop(addr(1), addr(2), 0.0)], 1000.0);
        let unprofitable = opportunity(vec![hop(addr(1), addr(2), 0.0)], 0.0);
        let gas = GasParameters {
            max_fee_per_gas_gwei: 1.0,
            max_priority_fee_per_gas_gwei: 0.1,
            gas_limit: 300_000,
        };
        assert!(accountant.simulate(&profitable, gas, 3000.0, 0.0).success);
        assert!(!accountant.simulate(&unprofitable, gas, 3000.0, 0.0).success);
    }

    #[test]
    fn net_profit_decimal_matches_expected_value() {
        let breakdown = ProfitBreakdown {
            gross_usd: 100.0,
            gas_cost_usd: 20.0,
            flash_loan_premium_usd: 5.0,
            slippage_usd: 10.0,
            net_usd: 65.0,
            net_percent: 65.0,
            meets_threshold: true,
        };
        assert_eq!(Accountant::net_profit_decimal(&breakdown), dec!(65));
    }
}
