//! Keeper entry point.
//!
//! Loads configuration, initialises structured logging, wires the
//! components for the configured mode, serves the status API and runs the
//! scheduler until Ctrl+C.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use keeper::chain::{BalanceSource, FixedBalance, RpcChainClient};
use keeper::config::AppConfig;
use keeper::dashboard;
use keeper::engine::{
    ExecutionEngine, KeeperComponents, KeeperIdentity, KeeperScheduler, LiveExecutor, Monitor,
    SimulatedExecutor,
};
use keeper::market::SimulatedMarket;
use keeper::strategy::{BaselineValidator, StrategyCalculator};
use keeper::types::{format_units, Mode};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let mut cfg = AppConfig::load_or_default("config.toml")?;
    cfg.apply_env_overrides().context("Invalid environment override")?;
    cfg.validate().context("Invalid configuration")?;

    init_logging(&cfg);

    let mode = cfg.scheduler.mode;
    info!(
        mode = %mode,
        network = %cfg.network.rpc_url,
        chain_id = cfg.network.chain_id,
        vault = %cfg.contracts.vault,
        pool = %cfg.contracts.pool,
        "Keeper starting up"
    );

    // -- Initialise components -------------------------------------------

    let (market_rng, exec_rng) = match cfg.demo.seed {
        Some(seed) => (StdRng::seed_from_u64(seed), StdRng::seed_from_u64(seed.wrapping_add(1))),
        None => (StdRng::from_entropy(), StdRng::from_entropy()),
    };

    let market = Arc::new(SimulatedMarket::new(cfg.market.clone(), market_rng));
    let calculator = StrategyCalculator::new(cfg.strategy.clone(), cfg.contracts.loan_token.clone(), market);

    let (engine, balance, network) = match mode {
        Mode::Demo => {
            info!(
                vault_balance = %format_units(cfg.demo.vault_balance, 6),
                "Demo mode: simulated execution against a fixed vault balance"
            );
            let engine: Arc<dyn ExecutionEngine> =
                Arc::new(SimulatedExecutor::new(cfg.simulation.clone(), exec_rng));
            let balance: Arc<dyn BalanceSource> = Arc::new(FixedBalance(cfg.demo.vault_balance));
            (engine, balance, "demo".to_string())
        }
        Mode::Production => {
            let client = Arc::new(
                RpcChainClient::new(cfg.network.clone(), cfg.contracts.clone())
                    .context("Failed to create RPC client")?,
            );
            info!(rpc_url = client.rpc_url(), "Production mode: live on-chain execution");
            let engine: Arc<dyn ExecutionEngine> = Arc::new(LiveExecutor::new(client.clone()));
            let balance: Arc<dyn BalanceSource> = client;
            (engine, balance, format!("chain {}", cfg.network.chain_id))
        }
    };

    let monitor = Arc::new(Monitor::new(cfg.monitoring.clone()));
    let scheduler = KeeperScheduler::new(
        cfg.scheduler.clone(),
        KeeperIdentity {
            account: cfg.network.account.clone(),
            network,
            venue: cfg.contracts.pool.clone(),
        },
        KeeperComponents {
            calculator,
            validator: Arc::new(BaselineValidator::new(cfg.risk.clone())),
            engine,
            balance,
            monitor: monitor.clone(),
        },
    );

    // -- Status server ---------------------------------------------------

    if cfg.status.enabled {
        dashboard::spawn_status_server(scheduler.clone(), cfg.status.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let loop_handle = scheduler.start();

    let summary_monitor = monitor.clone();
    let summary_interval = Duration::from_secs(cfg.monitoring.summary_interval_secs.max(1));
    let summary = tokio::spawn(async move {
        let mut interval = tokio::time::interval(summary_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            summary_monitor.log_summary().await;
        }
    });

    info!("Keeper running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");

    scheduler.stop();
    summary.abort();
    if let Some(handle) = loop_handle {
        // The in-flight cycle, if any, is allowed to finish.
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    monitor.log_summary().await;
    info!("Keeper shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keeper={}", cfg.monitoring.log_level)));

    let json_logging = std::env::var("KEEPER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
