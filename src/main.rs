//! Vigil Liquidation Engine
//!
//! Autonomous sentinel for collateralized debt escrows on the settlement
//! ledger. Features:
//! - Throttled asset price tracking with on-ledger publication
//! - Timer-driven full sweeps plus price-driven partial sweeps
//! - Epoch-based interest accrual matching the settlement contract
//! - Strictly serialized ledger access through a FIFO queue

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vigil_api::MarketDataClient;
use vigil_core::{
    config, init_config, EngineConfig, Liquidator, PositionStore, PriceTracker, Sentinel,
};
use vigil_ledger::{LedgerGateway, SerialQueue};

/// Environment variable names.
mod env {
    pub const LEDGER_GATEWAY_URL: &str = "LEDGER_GATEWAY_URL";
    pub const MARKET_DATA_URL: &str = "MARKET_DATA_URL";
    pub const TRACK_ASSETS: &str = "TRACK_ASSETS";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vigil_core=debug,vigil_ledger=debug")),
        )
        .init();

    // Load and initialize engine config (MUST be done before any core module usage)
    // Use VIGIL_PROFILE env var to select: testing, production, or a TOML file path
    let engine_config = EngineConfig::from_env();
    engine_config.log_config();
    init_config(engine_config);

    info!("Starting Vigil Liquidation Engine");

    let gateway_url = get_env(env::LEDGER_GATEWAY_URL)?;
    let market_url = get_env(env::MARKET_DATA_URL)?;

    // Initialize components
    let (tracker, sentinel) = initialize_components(&gateway_url, &market_url);

    // Seed tracked assets from the environment: "BTC:Bitcoin,ETH:Ether"
    seed_tracked_assets(&tracker);

    // Run main loops
    info!("Starting main loops...");
    let price_rx = tracker.subscribe();
    let tracker_task = tokio::spawn(tracker.run());
    let sentinel_task = tokio::spawn(sentinel.run(price_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping");
    tracker_task.abort();
    sentinel_task.abort();

    Ok(())
}

fn get_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("Missing env var: {}", name))
}

fn initialize_components(
    gateway_url: &str,
    market_url: &str,
) -> (Arc<PriceTracker>, Arc<Sentinel>) {
    info!("Initializing components...");
    let cfg = config();

    // Serialization queue: the single chokepoint for ledger access
    let queue = Arc::new(SerialQueue::new(cfg.queue.settle_delay()));

    // Settlement client gateway
    let ledger = Arc::new(LedgerGateway::new(gateway_url));
    info!(gateway = gateway_url, "Ledger gateway initialized");

    // Market-data client
    let market = Arc::new(MarketDataClient::new(market_url));
    info!(provider = market_url, "Market data client initialized");

    // Position store
    let store = Arc::new(PositionStore::new());

    // Price tracker
    let tracker = Arc::new(PriceTracker::new(
        market,
        ledger.clone(),
        queue.clone(),
        cfg.price.clone(),
    ));

    // Liquidation executor
    let liquidator = Arc::new(Liquidator::new(ledger.clone(), queue.clone()));

    // Sentinel
    let sentinel = Arc::new(Sentinel::new(
        store,
        tracker.clone(),
        liquidator,
        ledger,
        queue,
        cfg,
    ));

    info!("All components initialized");
    (tracker, sentinel)
}

/// Seed the tracker from `TRACK_ASSETS`, a comma-separated list of
/// `SYMBOL` or `SYMBOL:Display Name` entries.
fn seed_tracked_assets(tracker: &PriceTracker) {
    let Ok(raw) = std::env::var(env::TRACK_ASSETS) else {
        info!("No TRACK_ASSETS configured, starting with an empty watch list");
        return;
    };

    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let (symbol, display_name) = match entry.split_once(':') {
            Some((symbol, name)) => (symbol.trim(), name.trim()),
            None => (entry.trim(), entry.trim()),
        };
        match tracker.track(symbol, display_name) {
            Ok(asset) => info!(symbol = %asset.symbol, "Tracking asset"),
            Err(e) => tracing::warn!(symbol, error = %e, "Skipping asset from TRACK_ASSETS"),
        }
    }
    info!(count = tracker.asset_count(), "Asset watch list seeded");
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╦  ╦╦╔═╗╦╦
    ╚╗╔╝║║ ╦║║
     ╚╝ ╩╚═╝╩╩═╝
    Liquidation Engine v0.1.0
    "#
    );
}
