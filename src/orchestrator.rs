//! Orchestrator — the top-level state machine and per-cycle protocol tying
//! every other component together.
//!
//! The per-cycle loop (scan, filter candidates, execute the first passing
//! one, sleep) backs off on consecutive errors and is wrapped in the full
//! `Uninitialized -> Initializing -> Ready -> Running <-> Backoff ->
//! Stopping -> Stopped` state machine, with `EmergencyShutdown` reachable
//! from any state.

use crate::accountant::Accountant;
use crate::aggregator::AggregatorClient;
use crate::alerts::{AlertLevel, AlertSink};
use crate::config::Config;
use crate::error::{Disposition, EngineError};
use crate::gas_oracle::{Complexity, GasOracle, Urgency};
use crate::metrics::Metrics;
use crate::mev_guard::MevGuard;
use crate::scanner::Scanner;
use crate::token_registry::TokenRegistry;
use crate::transport::RpcTransport;
use crate::tx_builder::TxBuilder;
use crate::types::Opportunity;
use crate::zscore::ZScoreEngine;
use alloy::primitives::{Address, U256};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    Backoff,
    Stopping,
    Stopped,
    EmergencyShutdown,
}

const MIN_CYCLE_SLEEP_SECS: u64 = 1;
const MAX_CYCLE_SLEEP_SECS: u64 = 30;
const TOP_CANDIDATES_PER_CYCLE: usize = 5;

pub struct Orchestrator {
    config: Config,
    transport: std::sync::Arc<RpcTransport>,
    registry: TokenRegistry,
    aggregator: AggregatorClient,
    zscore: ZScoreEngine,
    gas_oracle: GasOracle,
    mev_guard: MevGuard,
    tx_builder: TxBuilder,
    metrics: Metrics,
    alerts: AlertSink,
    state: RwLock<State>,
    consecutive_errors: AtomicU32,
    backoff_secs: AtomicU64,
    gas_token_price_usd: RwLock<f64>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        transport: std::sync::Arc<RpcTransport>,
        registry: TokenRegistry,
        aggregator: AggregatorClient,
        zscore: ZScoreEngine,
        gas_oracle: GasOracle,
        mev_guard: MevGuard,
        tx_builder: TxBuilder,
        alerts: AlertSink,
    ) -> Self {
        Self {
            config,
            transport,
            registry,
            aggregator,
            zscore,
            gas_oracle,
            mev_guard,
            tx_builder,
            metrics: Metrics::new(),
            alerts,
            state: RwLock::new(State::Uninitialized),
            consecutive_errors: AtomicU32::new(0),
            backoff_secs: AtomicU64::new(MIN_CYCLE_SLEEP_SECS),
            gas_token_price_usd: RwLock::new(0.0),
        }
    }

    pub fn state(&self) -> State {
        *self.state.read().unwrap()
    }

    fn set_state(&self, state: State) {
        let mut guard = self.state.write().unwrap();
        info!(from = ?*guard, to = ?state, "orchestrator state transition");
        *guard = state;
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Forward an observed mempool transaction into the MEV Guard's sliding
    /// window.
    pub fn ingest_mempool_tx(&self, tx: crate::mev_guard::ObservedTx) {
        self.mev_guard.ingest(tx);
    }

    /// `ConfigInvalid` at startup is fatal — refuse to leave
    /// `Initializing`.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.set_state(State::Initializing);
        if let Err(e) = self.config.validate() {
            self.set_state(State::EmergencyShutdown);
            self.alerts
                .send_alert(
                    AlertLevel::Critical,
                    "startup configuration invalid",
                    &e,
                    serde_json::json!({}),
                )
                .await;
            return Err(EngineError::ConfigInvalid(e));
        }
        self.set_state(State::Ready);
        Ok(())
    }

    /// Runs cycles until `EmergencyShutdown` or an external stop signal.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        self.set_state(State::Running);
        loop {
            if *shutdown.borrow() {
                self.set_state(State::Stopping);
                break;
            }
            if self.state() == State::EmergencyShutdown {
                break;
            }

            match self.run_cycle().await {
                Ok(()) => {
                    self.consecutive_errors.store(0, Ordering::Relaxed);
                    self.backoff_secs.store(MIN_CYCLE_SLEEP_SECS, Ordering::Relaxed);
                }
                Err(e) => self.handle_cycle_error(e).await,
            }

            if self.state() == State::EmergencyShutdown {
                break;
            }

            let sleep_secs = self.backoff_secs.load(Ordering::Relaxed).clamp(MIN_CYCLE_SLEEP_SECS, MAX_CYCLE_SLEEP_SECS);
            tokio::select! {
                _ = shutdown.changed() => { self.set_state(State::Stopping); break; }
                _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {}
            }
        }
        self.set_state(State::Stopped);
    }

    async fn handle_cycle_error(&self, e: EngineError) {
        match e.disposition() {
            Disposition::Fatal => {
                error!(error = %e, "fatal error, emergency shutdown");
                self.alerts
                    .send_alert(AlertLevel::Critical, "fatal error", &e.to_string(), serde_json::json!({}))
                    .await;
                self.set_state(State::EmergencyShutdown);
            }
            Disposition::CycleError => {
                let count = self.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %e, count, "cycle error");
                self.set_state(State::Backoff);
                let backoff = self.backoff_secs.load(Ordering::Relaxed) * 2;
                self.backoff_secs.store(backoff.min(MAX_CYCLE_SLEEP_SECS), Ordering::Relaxed);
                if count >= self.config.max_consecutive_errors {
                    error!(count, "too many consecutive cycle errors, emergency shutdown");
                    self.alerts
                        .send_alert(
                            AlertLevel::Critical,
                            "too many consecutive errors",
                            &format!("{count} consecutive cycle errors"),
                            serde_json::json!({"count": count}),
                        )
                        .await;
                    self.set_state(State::EmergencyShutdown);
                } else {
                    self.set_state(State::Running);
                }
            }
            Disposition::Surface | Disposition::Veto => {
                warn!(error = %e, "non-fatal cycle issue");
            }
        }
    }

    /// One pass: wait-for-gas check, scan, rank, and attempt execution of the
    /// first candidate that clears every gate.
    async fn run_cycle(&self) -> Result<(), EngineError> {
        let scan_start = std::time::Instant::now();

        let gas_token_price = *self.gas_token_price_usd.read().unwrap();
        let accountant = Accountant::new(
            &self.registry,
            self.config.flash_loan_premium_bps,
            self.config.min_profit_threshold_usd,
        );
        let scanner = Scanner::new(
            &self.registry,
            &self.aggregator,
            &self.zscore,
            &accountant,
            &self.gas_oracle,
            self.config.max_hops,
            gas_token_price,
        );
        let pairs: Vec<(Address, Address)> = self
            .registry
            .base_tokens()
            .iter()
            .flat_map(|base| {
                self.registry
                    .top_alt_tokens_by_liquidity(10, 50_000.0)
                    .into_iter()
                    .map(move |alt| (base.address, alt.address))
            })
            .collect();

        let mut candidates = scanner.scan(&pairs).await;
        candidates.truncate(TOP_CANDIDATES_PER_CYCLE);
        self.metrics
            .record_scan(candidates.len() as u64, scan_start.elapsed().as_millis() as u64);

        for opportunity in &candidates {
            match self.try_execute(opportunity, &accountant, gas_token_price).await {
                Ok(()) => return Ok(()),
                Err(e) if e.disposition() == Disposition::Veto => {
                    info!(reason = %e, "opportunity vetoed");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn try_execute(
        &self,
        opportunity: &Opportunity,
        accountant: &Accountant<'_>,
        gas_token_price: f64,
    ) -> Result<(), EngineError> {
        let exec_start = std::time::Instant::now();
        let per_call_gas_units: u64 = opportunity.hops.iter().map(|h| h.gas_estimate).sum();
        let gas = self
            .gas_oracle
            .optimal_gas_parameters(per_call_gas_units, Complexity::FlashLoan, Urgency::Normal);

        let flash_loan_notional_usd = Accountant::flash_loan_notional_usd(opportunity);
        let breakdown = accountant.account(opportunity, gas, gas_token_price, flash_loan_notional_usd);

        if let Some(wait) = self.gas_oracle.should_wait_for_better_gas(opportunity, breakdown.gas_cost_usd) {
            return Err(EngineError::WaitForGas(wait.reason));
        }

        self.mev_guard.check(opportunity, gas.max_fee_per_gas_gwei)?;
        accountant.check_threshold(&breakdown)?;

        let min_profit = U256::from((breakdown.net_usd.max(0.0) * 1e6) as u128);
        let (tx_hash, raw, nonce) = self.tx_builder.build_arbitrage(opportunity, gas, min_profit).await?;
        self.tx_builder
            .broadcast(tx_hash.clone(), raw, nonce, opportunity.kind)
            .await?;

        self.metrics
            .record_execution(true, breakdown.net_usd, exec_start.elapsed().as_millis() as u64);
        self.alerts
            .send_alert(
                AlertLevel::Success,
                "arbitrage executed",
                &format!("net profit ${:.2}", breakdown.net_usd),
                serde_json::json!({"tx_hash": tx_hash}),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            chain_id: 8453,
            rpc_nodes: vec![],
            rpc_settings: crate::config::RpcSettings::default(),
            base_tokens: vec![],
            monitored_dexes: vec![],
            aggregator_priority: vec![],
            api_rate_limits: vec![],
            zscore_settings: crate::config::ZScoreSettings::default(),
            max_gas_price_gwei: 100,
            min_profit_threshold_usd: 5.0,
            flash_loan_premium_bps: 9,
            max_hops: 6,
            test_mode: true,
            max_consecutive_errors: 3,
        }
    }

    #[test]
    fn invalid_config_rejected_shape() {
        let mut cfg = test_config();
        cfg.rpc_nodes.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sleep_duration_is_clamped() {
        let s = 0u64.clamp(MIN_CYCLE_SLEEP_SECS, MAX_CYCLE_SLEEP_SECS);
        assert_eq!(s, MIN_CYCLE_SLEEP_SECS);
        let s = 1000u64.clamp(MIN_CYCLE_SLEEP_SECS, MAX_CYCLE_SLEEP_SECS);
        assert_eq!(s, MAX_CYCLE_SLEEP_SECS);
    }
}
