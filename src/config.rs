//! Configuration loading — environment-based.
//!
//! Full JSON-file configuration loading and credential sourcing are external
//! collaborators; this module only defines the `Config` shape and a thin
//! env-based loader sufficient to run the binary and tests.

use anyhow::{Context, Result};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub max_requests_per_second: u32,
    pub max_requests_per_minute: u32,
    pub request_timeout_ms: u64,
    pub health_check_interval_ms: u64,
    pub unhealthy_timeout_ms: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            max_requests_per_second: 10,
            max_requests_per_minute: 300,
            request_timeout_ms: 20_000,
            health_check_interval_ms: 30_000,
            unhealthy_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZScoreSettings {
    pub window_size: usize,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
}

impl Default for ZScoreSettings {
    fn default() -> Self {
        Self {
            window_size: 500,
            entry_threshold: 2.0,
            exit_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiRateLimit {
    pub service: String,
    pub requests_per_minute: u32,
}

/// Startup configuration table.
#[derive(Debug, Clone)]
pub struct Config {
    pub chain_id: u64,
    pub rpc_nodes: Vec<String>,
    pub rpc_settings: RpcSettings,
    pub base_tokens: Vec<String>,
    pub monitored_dexes: Vec<String>,
    pub aggregator_priority: Vec<String>,
    pub api_rate_limits: Vec<ApiRateLimit>,
    pub zscore_settings: ZScoreSettings,
    pub max_gas_price_gwei: u64,
    pub min_profit_threshold_usd: f64,
    pub flash_loan_premium_bps: u32,
    pub max_hops: usize,
    pub test_mode: bool,
    pub max_consecutive_errors: u32,
}

impl Config {
    /// ConfigInvalid at startup means "log all errors, emit a critical
    /// alert, refuse to transition out of Initializing" — the orchestrator
    /// is responsible for that; this method only validates shape.
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc_nodes.is_empty() {
            return Err("rpcNodes must not be empty".into());
        }
        if self.base_tokens.is_empty() {
            return Err("baseTokens must not be empty".into());
        }
        if self.max_hops == 0 {
            return Err("maxHops must be > 0".into());
        }
        if self.zscore_settings.window_size == 0 {
            return Err("zScoreSettings.windowSize must be > 0".into());
        }
        Ok(())
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load configuration from process environment (`.env` honored via `dotenvy`).
pub fn load_config() -> Result<Config> {
    dotenvy::dotenv().ok();

    let rpc_nodes = split_csv(&std::env::var("RPC_NODES").context("RPC_NODES not set")?);
    let base_tokens = split_csv(&std::env::var("BASE_TOKENS").context("BASE_TOKENS not set")?);
    let monitored_dexes = std::env::var("MONITORED_DEXES")
        .map(|s| split_csv(&s))
        .unwrap_or_default();
    let aggregator_priority = std::env::var("AGGREGATOR_PRIORITY")
        .map(|s| split_csv(&s))
        .unwrap_or_default();

    let api_rate_limits = std::env::var("API_RATE_LIMITS")
        .map(|s| {
            s.split(',')
                .filter_map(|entry| {
                    let mut parts = entry.splitn(2, ':');
                    let service = parts.next()?.trim().to_string();
                    let rpm = parts.next()?.trim().parse().ok()?;
                    Some(ApiRateLimit {
                        service,
                        requests_per_minute: rpm,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Config {
        chain_id: std::env::var("CHAIN_ID")
            .context("CHAIN_ID not set")?
            .parse()
            .context("CHAIN_ID must be numeric")?,
        rpc_nodes,
        rpc_settings: RpcSettings {
            max_requests_per_second: env_parse("RPC_MAX_REQUESTS_PER_SECOND", 10),
            max_requests_per_minute: env_parse("RPC_MAX_REQUESTS_PER_MINUTE", 300),
            request_timeout_ms: env_parse("RPC_REQUEST_TIMEOUT_MS", 20_000),
            health_check_interval_ms: env_parse("RPC_HEALTH_CHECK_INTERVAL_MS", 30_000),
            unhealthy_timeout_ms: env_parse("RPC_UNHEALTHY_TIMEOUT_MS", 60_000),
        },
        base_tokens,
        monitored_dexes,
        aggregator_priority,
        api_rate_limits,
        zscore_settings: ZScoreSettings {
            window_size: env_parse("ZSCORE_WINDOW_SIZE", 500),
            entry_threshold: env_parse("ZSCORE_ENTRY_THRESHOLD", 2.0),
            exit_threshold: env_parse("ZSCORE_EXIT_THRESHOLD", 0.5),
        },
        max_gas_price_gwei: env_parse("MAX_GAS_PRICE_GWEI", 200),
        min_profit_threshold_usd: env_parse("MIN_PROFIT_THRESHOLD_USD", 5.0),
        flash_loan_premium_bps: env_parse("FLASH_LOAN_PREMIUM_BPS", 9),
        max_hops: env_parse("MAX_HOPS", 6),
        test_mode: env_parse("TEST_MODE", false),
        max_consecutive_errors: env_parse("MAX_CONSECUTIVE_ERRORS", 10),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            chain_id: 8453,
            rpc_nodes: vec!["https://rpc.example".into()],
            rpc_settings: RpcSettings::default(),
            base_tokens: vec!["WETH".into()],
            monitored_dexes: vec![],
            aggregator_priority: vec![],
            api_rate_limits: vec![],
            zscore_settings: ZScoreSettings::default(),
            max_gas_price_gwei: 100,
            min_profit_threshold_usd: 5.0,
            flash_loan_premium_bps: 9,
            max_hops: 6,
            test_mode: true,
            max_consecutive_errors: 10,
        }
    }

    #[test]
    fn validate_rejects_empty_rpc_nodes() {
        let mut cfg = valid_config();
        cfg.rpc_nodes.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        assert!(valid_config().validate().is_ok());
    }
}
