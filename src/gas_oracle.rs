//! Gas Oracle — tracks recent base-fee/priority-fee/utilization history in a
//! bounded `VecDeque` ring buffer and recommends EIP-1559 parameters scaled
//! to opportunity urgency and call complexity.

use crate::types::Opportunity;
use std::collections::VecDeque;
use std::sync::RwLock;

const HISTORY_CAPACITY: usize = 50;
const TREND_WINDOW: usize = 10;
const FALLBACK_PRIORITY_FEE_GWEI: f64 = 1.5;
const BASE_GAS_UNITS: u64 = 21_000;
const GAS_LIMIT_SAFETY_BUFFER: f64 = 1.3;
const GAS_COST_PROFIT_RATIO_CEILING: f64 = 0.3;
const BASE_FEE_TREND_FLOOR: f64 = -0.05;
const BLOCK_UTILIZATION_CEILING: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct FeeSample {
    pub base_fee_gwei: f64,
    pub priority_fee_gwei: f64,
    pub gas_used_ratio: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GasParameters {
    pub max_fee_per_gas_gwei: f64,
    pub max_priority_fee_per_gas_gwei: f64,
    pub gas_limit: u64,
}

/// Relative urgency of an opportunity, driving the priority-fee multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    High,
    Urgent,
}

impl Urgency {
    fn multiplier(self) -> f64 {
        match self {
            Urgency::Low => 1.0,
            Urgency::Normal => 1.1,
            Urgency::High => 1.3,
            Urgency::Urgent => 1.5,
        }
    }
}

/// Complexity of the call being priced. Drives the priority-fee multiplier
/// and, combined with the caller-supplied per-call gas units, `gasLimit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
    FlashLoan,
}

impl Complexity {
    fn multiplier(self) -> f64 {
        match self {
            Complexity::Simple => 1.0,
            Complexity::Medium => 1.05,
            Complexity::Complex => 1.1,
            Complexity::FlashLoan => 1.15,
        }
    }
}

/// Reason a gas-wait gate fired, surfaced to the caller for logging/alerting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitForGas {
    pub reason: String,
}

fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = (((sorted.len() - 1) as f64) * p).round() as usize;
    Some(sorted[idx])
}

pub struct GasOracle {
    history: RwLock<VecDeque<FeeSample>>,
    max_gas_price_gwei: u64,
}

impl GasOracle {
    pub fn new(max_gas_price_gwei: u64) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            max_gas_price_gwei,
        }
    }

    pub fn record_sample(&self, sample: FeeSample) {
        let mut history = self.history.write().unwrap();
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(sample);
    }

    /// Recommend EIP-1559 parameters for a call of the given complexity at a
    /// given urgency. `maxFeePerGas` is always clamped to the configured
    /// ceiling (`GasTooHigh` must never trigger on our own recommendation).
    /// The priority fee tracks the 60th percentile of recent priority-fee
    /// samples, falling back to `FALLBACK_PRIORITY_FEE_GWEI` with no history.
    pub fn optimal_gas_parameters(
        &self,
        per_call_gas_units: u64,
        complexity: Complexity,
        urgency: Urgency,
    ) -> GasParameters {
        let history = self.history.read().unwrap();
        let base_fee = history.back().map(|s| s.base_fee_gwei).unwrap_or(1.0);
        let samples: Vec<f64> = history.iter().map(|s| s.priority_fee_gwei).collect();
        drop(history);
        let base_priority_fee = percentile(&samples, 0.6).unwrap_or(FALLBACK_PRIORITY_FEE_GWEI);

        let priority_fee = base_priority_fee * urgency.multiplier() * complexity.multiplier();
        let max_fee = (base_fee + priority_fee).min(self.max_gas_price_gwei as f64);
        let gas_limit = ((BASE_GAS_UNITS + per_call_gas_units) as f64 * GAS_LIMIT_SAFETY_BUFFER) as u64;

        GasParameters {
            max_fee_per_gas_gwei: max_fee,
            max_priority_fee_per_gas_gwei: priority_fee.min(max_fee),
            gas_limit,
        }
    }

    /// Average per-block fractional change in base fee over the trailing
    /// `TREND_WINDOW` samples. Negative means falling.
    fn base_fee_trend(&self) -> f64 {
        let history = self.history.read().unwrap();
        let n = history.len();
        if n < 2 {
            return 0.0;
        }
        let window = n.min(TREND_WINDOW);
        let start = n - window;
        let first = history[start].base_fee_gwei;
        let last = history[n - 1].base_fee_gwei;
        if first == 0.0 {
            return 0.0;
        }
        (last - first) / first / (window - 1).max(1) as f64
    }

    fn latest_gas_used_ratio(&self) -> f64 {
        self.history
            .read()
            .unwrap()
            .back()
            .map(|s| s.gas_used_ratio)
            .unwrap_or(0.0)
    }

    /// Gate execution when gas conditions favor waiting: the recommended gas
    /// cost eats too much of the expected profit, the base fee is falling
    /// fast enough that waiting is likely cheaper, or the chain is congested
    /// enough that inclusion itself is at risk. Returns the first condition
    /// that fires.
    pub fn should_wait_for_better_gas(
        &self,
        opportunity: &Opportunity,
        gas_cost_usd: f64,
    ) -> Option<WaitForGas> {
        if opportunity.expected_gross_profit_usd > 0.0
            && gas_cost_usd / opportunity.expected_gross_profit_usd > GAS_COST_PROFIT_RATIO_CEILING
        {
            return Some(WaitForGas {
                reason: "Gas cost > 30% of profit".into(),
            });
        }

        if self.base_fee_trend() < BASE_FEE_TREND_FLOOR {
            return Some(WaitForGas {
                reason: "Base fee falling, better entry likely soon".into(),
            });
        }

        if self.latest_gas_used_ratio() > BLOCK_UTILIZATION_CEILING {
            return Some(WaitForGas {
                reason: "Block utilization too high".into(),
            });
        }

        None
    }
}
