//! Error taxonomy and propagation policy.
//!
//! Every fallible operation in the engine returns (or wraps) an [`EngineError`]
//! so the orchestrator can pattern-match on `kind()` to decide whether to
//! veto an opportunity, retry locally, or escalate to a cycle error.

use thiserror::Error;

/// The closed set of error kinds the engine distinguishes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    #[error("profit below threshold: net ${net:.2} < min ${min:.2}")]
    ProfitBelowThreshold { net: f64, min: f64 },

    #[error("gas too high: {actual_gwei} gwei > {max_gwei} gwei max")]
    GasTooHigh { actual_gwei: u64, max_gwei: u64 },

    #[error("waiting for better gas: {0}")]
    WaitForGas(String),

    #[error("MEV veto: {0}")]
    MevVeto(String),

    #[error("nonce mismatch: expected {expected}, chain reports {actual}")]
    NonceMismatch { expected: u64, actual: u64 },

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("confirmation timeout after {0}s")]
    ConfirmationTimeout(u64),

    #[error("contract reverted: {0}")]
    ContractReverted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Orchestrator-level disposition for an error under the propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Per-opportunity veto: logged, counted, never fatal.
    Veto,
    /// Local recovery already exhausted all sources/endpoints; surface but don't
    /// count as a cycle error by itself.
    Surface,
    /// Counts toward the orchestrator's consecutive cycle-error counter.
    CycleError,
    /// Unconditional, immediate transition to EmergencyShutdown.
    Fatal,
}

impl EngineError {
    pub fn disposition(&self) -> Disposition {
        match self {
            EngineError::ConfigInvalid(_) => Disposition::Fatal,
            EngineError::TransportUnavailable(_)
            | EngineError::RateLimited(_)
            | EngineError::QuoteUnavailable(_) => Disposition::Surface,
            EngineError::SimulationFailed(_)
            | EngineError::ProfitBelowThreshold { .. }
            | EngineError::GasTooHigh { .. }
            | EngineError::WaitForGas(_)
            | EngineError::MevVeto(_) => Disposition::Veto,
            EngineError::NonceMismatch { .. } => Disposition::CycleError,
            EngineError::ContractReverted(_)
            | EngineError::BroadcastFailed(_)
            | EngineError::ConfirmationTimeout(_) => Disposition::CycleError,
            EngineError::Internal(_) => Disposition::CycleError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_is_fatal() {
        assert_eq!(
            EngineError::ConfigInvalid("missing rpcNodes".into()).disposition(),
            Disposition::Fatal
        );
    }

    #[test]
    fn veto_kinds_never_fatal() {
        let vetoes = [
            EngineError::SimulationFailed("x".into()),
            EngineError::ProfitBelowThreshold { net: 0.1, min: 1.0 },
            EngineError::GasTooHigh { actual_gwei: 500, max_gwei: 100 },
            EngineError::WaitForGas("base fee falling".into()),
            EngineError::MevVeto("sandwich".into()),
        ];
        for e in vetoes {
            assert_eq!(e.disposition(), Disposition::Veto);
        }
    }
}
