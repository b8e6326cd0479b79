//! Core data model — the entities shared across components.
//!
//! On-chain amounts are always `U256` in the token's smallest unit. USD
//! values are `f64`/`Decimal` and are derived, never fed back into on-chain
//! amounts.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Known token in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub is_stable: bool,
    pub is_base: bool,
    pub last_price_usd: f64,
    pub last_liquidity_usd: f64,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            is_stable: false,
            is_base: false,
            last_price_usd: 0.0,
            last_liquidity_usd: 0.0,
        }
    }
}

/// Kind of a tracked pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    BaseBase,
    BaseAlt,
}

/// Cointegration attributes, populated once a pair has been tested.
#[derive(Debug, Clone, Copy, Default)]
pub struct CointegrationStats {
    pub half_life: f64,
    pub hurst_exponent: f64,
    pub slope: f64,
    pub intercept: f64,
    pub adf_statistic: f64,
    pub r_squared: f64,
}

/// An ordered, unordered-at-construction pair of tokens tracked by the
/// Z-Score Engine.
#[derive(Debug, Clone)]
pub struct Pair {
    pub token_a: Address,
    pub token_b: Address,
    pub kind: PairKind,
    pub cointegration: Option<CointegrationStats>,
    pub cointegration_tested_at: Option<u64>,
}

impl Pair {
    pub fn new(token_a: Address, token_b: Address, kind: PairKind) -> Self {
        Self {
            token_a,
            token_b,
            kind,
            cointegration: None,
            cointegration_tested_at: None,
        }
    }

    pub fn is_cointegrated(&self) -> bool {
        self.cointegration.is_some()
    }
}

/// A single price observation, stored in a bounded ring per token.
#[derive(Debug, Clone, Copy)]
pub struct PriceSample {
    pub price_usd: f64,
    pub timestamp: u64,
}

/// Fixed-capacity ring buffer of price samples, oldest discarded on overflow.
/// Capacity is `window_size * 1.5`, truncated to `window_size` on overflow.
#[derive(Debug, Clone)]
pub struct PriceRing {
    capacity: usize,
    samples: std::collections::VecDeque<PriceSample>,
}

impl PriceRing {
    pub fn new(window_size: usize) -> Self {
        let capacity = ((window_size as f64) * 1.5).ceil() as usize;
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: std::collections::VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: PriceSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<PriceSample> {
        self.samples.back().copied()
    }

    /// Most recent `n` samples, oldest first.
    pub fn recent(&self, n: usize) -> Vec<PriceSample> {
        let len = self.samples.len();
        let skip = len.saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn all(&self) -> Vec<PriceSample> {
        self.samples.iter().copied().collect()
    }
}

/// A routing source: either a direct on-chain router or an HTTP aggregator.
/// Closed tagged variant — dispatch is a match, never dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingSource {
    UniswapV3,
    SushiV3,
    QuickswapV3Algebra,
    QuickswapV2,
    OneInch,
    Paraswap,
    Odos,
}

impl RoutingSource {
    pub fn is_direct_dex(&self) -> bool {
        matches!(
            self,
            RoutingSource::UniswapV3
                | RoutingSource::SushiV3
                | RoutingSource::QuickswapV3Algebra
                | RoutingSource::QuickswapV2
        )
    }

    pub fn is_http_aggregator(&self) -> bool {
        !self.is_direct_dex()
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoutingSource::UniswapV3 => "uniswap_v3",
            RoutingSource::SushiV3 => "sushi_v3",
            RoutingSource::QuickswapV3Algebra => "quickswap_v3",
            RoutingSource::QuickswapV2 => "quickswap_v2",
            RoutingSource::OneInch => "1inch",
            RoutingSource::Paraswap => "paraswap",
            RoutingSource::Odos => "odos",
        }
    }
}

/// One token→token swap inside a path. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Hop {
    pub from_token: Address,
    pub to_token: Address,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub source: RoutingSource,
    pub routing_payload: Vec<u8>,
    pub gas_estimate: u64,
    pub price_impact: f64,
}

impl Hop {
    /// Invariant: `amountIn > 0`, `minAmountOut >= 0`,
    /// `minAmountOut <= amountIn * max_plausible_rate`.
    pub fn validate(&self, max_plausible_rate: f64) -> Result<(), String> {
        if self.amount_in.is_zero() {
            return Err("amountIn must be > 0".into());
        }
        let amount_in_f = self.amount_in.to::<u128>() as f64;
        let min_out_f = self.min_amount_out.to::<u128>() as f64;
        if min_out_f > amount_in_f * max_plausible_rate {
            return Err("minAmountOut exceeds max plausible rate".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityKind {
    Statistical,
    Triangular,
    MultiHop,
}

/// A snapshot of the z-score state that produced a statistical opportunity,
/// kept for audit/logging purposes.
#[derive(Debug, Clone, Copy)]
pub struct ZScoreSnapshot {
    pub z: f64,
    pub confidence: f64,
    pub half_life: f64,
    pub hurst_exponent: f64,
}

/// A candidate arbitrage opportunity, produced by the Scanner and annotated
/// by the Accountant.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub hops: Vec<Hop>,
    pub input_amount: U256,
    pub expected_output: U256,
    pub expected_gross_profit_usd: f64,
    pub deadline: u64,
    pub z_score: Option<ZScoreSnapshot>,
    pub created_at: u64,
}

impl Opportunity {
    /// Invariant: the path is a closed cycle on the flash-loan asset.
    pub fn is_closed_cycle(&self) -> bool {
        match (self.hops.first(), self.hops.last()) {
            (Some(first), Some(last)) => first.from_token == last.to_token,
            _ => false,
        }
    }

    pub fn flash_loan_asset(&self) -> Option<Address> {
        self.hops.first().map(|h| h.from_token)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.deadline <= now
    }
}

/// Health state of an RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    Healthy,
    Unhealthy,
}

/// One RPC endpoint, process-lifetime. Health/failure fields are mutated only
/// by the transport task that performed the call or probe.
#[derive(Debug, Clone)]
pub struct RpcEndpointMeta {
    pub url: String,
    pub health: EndpointHealth,
    pub consecutive_failures: u32,
    pub last_checked: u64,
}

impl RpcEndpointMeta {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            health: EndpointHealth::Healthy,
            consecutive_failures: 0,
            last_checked: now_secs(),
        }
    }
}

/// A transaction tracked from broadcast until receipt or timeout.
#[derive(Debug, Clone)]
pub struct PendingTx {
    pub tx_hash: String,
    pub nonce: u64,
    pub signed_payload: Vec<u8>,
    pub opportunity_kind: OpportunityKind,
    pub submit_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn sample_hop(from: Address, to: Address) -> Hop {
        Hop {
            from_token: from,
            to_token: to,
            amount_in: U256::from(1_000_000u64),
            min_amount_out: U256::from(1u64),
            source: RoutingSource::UniswapV3,
            routing_payload: vec![],
            gas_estimate: 120_000,
            price_impact: 0.001,
        }
    }

    #[test]
    fn opportunity_closed_cycle_invariant() {
        let weth = addr(1);
        let usdc = addr(2);
        let cbeth = addr(3);
        let hops = vec![
            sample_hop(weth, usdc),
            sample_hop(usdc, cbeth),
            sample_hop(cbeth, weth),
        ];
        let opp = Opportunity {
            kind: OpportunityKind::Triangular,
            hops,
            input_amount: U256::from(1u64),
            expected_output: U256::from(1u64),
            expected_gross_profit_usd: 1.0,
            deadline: now_secs() + 60,
            z_score: None,
            created_at: now_secs(),
        };
        assert!(opp.is_closed_cycle());
        assert_eq!(opp.flash_loan_asset(), Some(weth));
    }

    #[test]
    fn opportunity_not_closed_when_assets_differ() {
        let weth = addr(1);
        let usdc = addr(2);
        let opp = Opportunity {
            kind: OpportunityKind::Triangular,
            hops: vec![sample_hop(weth, usdc)],
            input_amount: U256::from(1u64),
            expected_output: U256::from(1u64),
            expected_gross_profit_usd: 1.0,
            deadline: now_secs() + 60,
            z_score: None,
            created_at: now_secs(),
        };
        assert!(!opp.is_closed_cycle());
    }

    #[test]
    fn hop_validate_rejects_zero_amount_in() {
        let hop = Hop {
            amount_in: U256::ZERO,
            ..sample_hop(addr(1), addr(2))
        };
        assert!(hop.validate(1e12).is_err());
    }

    #[test]
    fn price_ring_truncates_on_overflow() {
        let mut ring = PriceRing::new(4); // capacity = 6
        for i in 0..10u64 {
            ring.push(PriceSample {
                price_usd: i as f64,
                timestamp: i,
            });
        }
        assert!(ring.len() <= 6);
        // Most recent sample is retained.
        assert_eq!(ring.latest().unwrap().timestamp, 9);
    }

    #[test]
    fn deadline_expiry() {
        let opp = Opportunity {
            kind: OpportunityKind::Triangular,
            hops: vec![],
            input_amount: U256::ZERO,
            expected_output: U256::ZERO,
            expected_gross_profit_usd: 0.0,
            deadline: 100,
            z_score: None,
            created_at: 0,
        };
        assert!(opp.is_expired(101));
        assert!(opp.is_expired(100));
        assert!(!opp.is_expired(99));
    }
}
