//! On-chain arbitrage engine for an EVM-compatible L2.
//!
//! Scans multi-hop and statistical-arbitrage opportunities across direct DEX
//! routers and HTTP swap aggregators, accounts for gas/slippage/flash-loan
//! costs, screens candidates against mempool adversaries, and executes the
//! first one that clears every gate.

pub mod accountant;
pub mod aggregator;
pub mod alerts;
pub mod bucket;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gas_oracle;
pub mod metrics;
pub mod mev_guard;
pub mod orchestrator;
pub mod ratelimit;
pub mod scanner;
pub mod token_registry;
pub mod transport;
pub mod tx_builder;
pub mod types;
pub mod zscore;

pub use config::{load_config, Config};
pub use error::{Disposition, EngineError};
pub use orchestrator::{Orchestrator, State};
