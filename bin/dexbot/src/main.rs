use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bus::{EventBus, LocalBroker};
use common::{Config, TradingMode, TradingModule};
use engine::jupiter::{self, JupiterConfig, JupiterTradingModule};
use engine::{ReplayFeed, Runner, TradeExecutor};
use paper::{PaperTradingModule, PriceTracker};
use risk::{RiskConfig, RiskGate};
use strategy::{StrategyFileConfig, StrategyRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading configuration")?;
    info!(mode = %cfg.trading_mode, wallet = %cfg.wallet, "DexBot starting");

    // ── Strategies ────────────────────────────────────────────────────────────
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)?;
    let registry = StrategyRegistry::from_config(&strategy_file)?;
    if registry.is_empty() {
        warn!(path = %cfg.strategy_config_path, "No strategies configured, nothing will trade");
    }

    // ── Event bus ─────────────────────────────────────────────────────────────
    let broker = LocalBroker::new(cfg.bus_capacity);
    let bus = Arc::new(EventBus::new(Arc::new(broker)));

    // ── Trading backend (injected based on TRADING_MODE) ─────────────────────
    let mut paper_tracker = None;
    let module: Arc<dyn TradingModule> = match cfg.trading_mode {
        TradingMode::Live => {
            let signer_url = cfg
                .signer_url
                .clone()
                .context("SIGNER_URL is required in live mode")?;
            info!(rpc = %cfg.rpc_url, "Live trading mode — using JupiterTradingModule");
            Arc::new(JupiterTradingModule::new(
                JupiterConfig::from_config(&cfg),
                jupiter::remote_signer(signer_url)?,
            )?)
        }
        TradingMode::Paper => {
            info!(
                balance = %cfg.paper_balance,
                slippage_bps = %cfg.paper_slippage_bps,
                "Paper trading mode — using PaperTradingModule"
            );
            let paper = Arc::new(PaperTradingModule::new(cfg.paper_balance, cfg.paper_slippage_bps));
            paper_tracker = Some(Arc::new(PriceTracker::new(paper.clone())));
            paper
        }
    };

    // ── Executor + runner ─────────────────────────────────────────────────────
    let executor = Arc::new(TradeExecutor::new(
        RiskGate::new(RiskConfig::from(&cfg)),
        module,
        cfg.wallet.clone(),
    ));
    let mut runner = Runner::new(bus.clone(), registry, executor);
    if let Some(tracker) = paper_tracker {
        runner = runner.with_observer(tracker);
    }

    let channels = runner.start_with_retry().await;
    info!(channels, "Strategies subscribed");

    // ── Optional replay publisher ─────────────────────────────────────────────
    if let Some(path) = &cfg.replay_path {
        let feed = ReplayFeed::load(path)?;
        let interval = Duration::from_millis(cfg.replay_interval_ms);
        let bus = bus.clone();
        tokio::spawn(async move {
            feed.run(&bus, interval).await;
        });
    }

    // Keep main alive
    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown signal received.");
    runner.stop().await;
    info!("DexBot stopped.");
    Ok(())
}
