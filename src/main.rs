//! Binary entry point: loads configuration, wires up every component, and
//! runs the orchestrator until shutdown.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use arb_engine::aggregator::AggregatorClient;
use arb_engine::alerts::AlertSink;
use arb_engine::config::load_config;
use arb_engine::gas_oracle::GasOracle;
use arb_engine::mev_guard::{run_mempool_subscriber, MevGuard};
use arb_engine::orchestrator::Orchestrator;
use arb_engine::token_registry::{ScamFilterMode, TokenRegistry};
use arb_engine::transport::RpcTransport;
use arb_engine::tx_builder::TxBuilder;
use arb_engine::types::RoutingSource;
use arb_engine::zscore::ZScoreEngine;
use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "arb-engine", about = "On-chain arbitrage engine")]
struct Cli {
    /// Run a single scan/execute cycle and exit, instead of looping.
    #[arg(long)]
    once: bool,

    /// Force test mode regardless of the TEST_MODE environment variable.
    #[arg(long)]
    test_mode: bool,

    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("arb-engine starting");

    let mut config = load_config().context("failed to load configuration")?;
    if cli.test_mode {
        config.test_mode = true;
    }

    let transport = Arc::new(RpcTransport::new(&config.rpc_nodes, config.rpc_settings.clone())?);

    let registry = TokenRegistry::new(if config.test_mode {
        ScamFilterMode::Advisory
    } else {
        ScamFilterMode::Strict
    });

    let sources = vec![
        RoutingSource::UniswapV3,
        RoutingSource::SushiV3,
        RoutingSource::QuickswapV3Algebra,
        RoutingSource::QuickswapV2,
        RoutingSource::OneInch,
        RoutingSource::Paraswap,
        RoutingSource::Odos,
    ];
    let aggregator = AggregatorClient::new(
        sources,
        std::time::Duration::from_millis(config.rpc_settings.request_timeout_ms),
        transport.clone(),
    );

    let zscore = ZScoreEngine::new(config.zscore_settings.clone());
    let gas_oracle = GasOracle::new(config.max_gas_price_gwei);
    let mev_guard = MevGuard::new();

    let signer = std::env::var("PRIVATE_KEY")
        .ok()
        .and_then(|pk| PrivateKeySigner::from_str(&pk).ok())
        .unwrap_or_else(PrivateKeySigner::random);
    let executor_contract: Address = std::env::var("EXECUTOR_CONTRACT_ADDRESS")
        .ok()
        .and_then(|a| a.parse().ok())
        .unwrap_or(Address::ZERO);
    let tx_builder = TxBuilder::new(
        transport.clone(),
        signer,
        executor_contract,
        config.chain_id,
        config.max_gas_price_gwei,
        0,
    );

    let alerts = AlertSink::new(std::env::var("ALERT_WEBHOOK_URL").ok());

    let orchestrator = Orchestrator::new(
        config,
        transport.clone(),
        registry,
        aggregator,
        zscore,
        gas_oracle,
        mev_guard,
        tx_builder,
        alerts,
    );

    if let Err(e) = orchestrator.initialize().await {
        error!(error = %e, "initialization failed");
        return Err(anyhow::anyhow!(e));
    }
    let orchestrator = Arc::new(orchestrator);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let (mempool_tx, mut mempool_rx) = tokio::sync::mpsc::channel(256);
    let mempool_task = tokio::spawn(run_mempool_subscriber(
        transport.clone(),
        mempool_tx,
        shutdown_rx.clone(),
    ));
    let mempool_forward_task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            while let Some(observed) = mempool_rx.recv().await {
                orchestrator.ingest_mempool_tx(observed);
            }
        })
    };

    if cli.once {
        info!("running a single cycle (--once)");
        shutdown_tx.send(true).ok();
        orchestrator.run(shutdown_rx).await;
        mempool_task.abort();
        mempool_forward_task.abort();
        return Ok(());
    }

    let mut signals = signal_hook_tokio::Signals::new([
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGINT,
    ])
    .context("failed to register signal handlers")?;

    let shutdown_task = tokio::spawn(async move {
        use tokio_stream::StreamExt;
        if signals.next().await.is_some() {
            info!("shutdown signal received");
            shutdown_tx.send(true).ok();
        }
    });

    orchestrator.run(shutdown_rx).await;
    shutdown_task.abort();
    mempool_task.abort();
    mempool_forward_task.abort();

    info!("arb-engine stopped");
    Ok(())
}
