//! Asset price tracking with throttled on-ledger publication.
//!
//! A fixed timer polls the market-data provider for every tracked asset,
//! caches the observed values, and decides per asset whether the ledger
//! copy is due for a refresh: publish on a threshold-sized move, on
//! staleness, or if the asset was never published. Publications go out in
//! ledger-sized batches through the serialization queue; after each
//! successful batch, subscribers hear about every asset in it before the
//! next batch is attempted.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use vigil_api::MarketDataSource;
use vigil_ledger::{LedgerClient, PricePublish, SerialQueue, TransactionId};

use crate::config::PriceConfig;
use crate::error::EngineError;

/// Basis-point denominator for percent-change comparisons.
const BPS_DENOMINATOR: u128 = 10_000;

/// Subscriber channel capacity. Senders await on a full channel, which is
/// what preserves the notify-before-next-batch ordering.
const SUBSCRIBER_BUFFER: usize = 64;

fn symbol_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Z0-9]{2,12}$").expect("valid symbol pattern"))
}

/// Validate and normalize an asset symbol.
pub(crate) fn normalize_symbol(symbol: &str) -> Result<String, EngineError> {
    let normalized = symbol.trim().to_uppercase();
    if !symbol_pattern().is_match(&normalized) {
        return Err(EngineError::Validation(format!(
            "malformed asset symbol '{symbol}'"
        )));
    }
    Ok(normalized)
}

/// A tracked asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub display_name: String,
    pub added_at: DateTime<Utc>,
}

/// Latest observed price for an asset. Overwritten every poll,
/// last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedPrice {
    /// USD scaled by 10^4.
    pub value: u64,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

/// What was last pushed on-ledger for an asset. Distinct from the observed
/// value because publishing is throttled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPrice {
    pub value: u64,
    pub published_at: DateTime<Utc>,
}

/// Event delivered to subscribers after a successful publication.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub symbol: String,
    /// USD scaled by 10^4.
    pub value: u64,
    pub published_at: DateTime<Utc>,
}

/// Combined cache view for the status façade.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub observed: Option<ObservedPrice>,
    pub published: Option<PublishedPrice>,
}

/// Tracks market prices for registered assets and mirrors them on-ledger.
pub struct PriceTracker {
    market: Arc<dyn MarketDataSource>,
    ledger: Arc<dyn LedgerClient>,
    queue: Arc<SerialQueue>,
    assets: DashMap<String, Asset>,
    observed: DashMap<String, ObservedPrice>,
    published: DashMap<String, PublishedPrice>,
    subscribers: RwLock<Vec<mpsc::Sender<PriceUpdate>>>,
    poll_interval: RwLock<Duration>,
    config: PriceConfig,
}

impl PriceTracker {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        ledger: Arc<dyn LedgerClient>,
        queue: Arc<SerialQueue>,
        config: PriceConfig,
    ) -> Self {
        let poll_interval = config.poll_interval();
        Self {
            market,
            ledger,
            queue,
            assets: DashMap::new(),
            observed: DashMap::new(),
            published: DashMap::new(),
            subscribers: RwLock::new(Vec::new()),
            poll_interval: RwLock::new(poll_interval),
            config,
        }
    }

    /// Start tracking an asset. Fails on duplicates and above the
    /// configured capacity.
    pub fn track(&self, symbol: &str, display_name: &str) -> Result<Asset, EngineError> {
        let symbol = normalize_symbol(symbol)?;

        if self.assets.contains_key(&symbol) {
            return Err(EngineError::Validation(format!(
                "asset '{symbol}' is already tracked"
            )));
        }
        if self.assets.len() >= self.config.max_tracked_assets {
            return Err(EngineError::Capacity(format!(
                "tracked asset limit of {} reached",
                self.config.max_tracked_assets
            )));
        }

        let asset = Asset {
            symbol: symbol.clone(),
            display_name: display_name.to_string(),
            added_at: Utc::now(),
        };
        self.assets.insert(symbol.clone(), asset.clone());
        info!(symbol = %symbol, "asset tracked");
        Ok(asset)
    }

    /// Stop tracking an asset and drop its cached state. Idempotent.
    pub fn untrack(&self, symbol: &str) {
        let symbol = symbol.trim().to_uppercase();
        let removed = self.assets.remove(&symbol).is_some();
        self.observed.remove(&symbol);
        self.published.remove(&symbol);
        if removed {
            info!(symbol = %symbol, "asset untracked");
        }
    }

    /// All tracked assets, ordered by symbol.
    pub fn list_assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.assets.iter().map(|e| e.value().clone()).collect();
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assets
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Latest observed price for an asset, if any. Sweeps use this cache
    /// and retain last-known values across failed polls.
    pub fn cached_price(&self, symbol: &str) -> Option<u64> {
        self.observed.get(symbol).map(|p| p.value)
    }

    /// Full cache view, ordered by symbol.
    pub fn snapshots(&self) -> Vec<PriceSnapshot> {
        let mut snapshots: Vec<PriceSnapshot> = self
            .assets
            .iter()
            .map(|e| PriceSnapshot {
                symbol: e.key().clone(),
                observed: self.observed.get(e.key()).map(|p| p.clone()),
                published: self.published.get(e.key()).map(|p| p.clone()),
            })
            .collect();
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        snapshots
    }

    /// Register a consumer for post-publication price updates.
    pub fn subscribe(&self) -> mpsc::Receiver<PriceUpdate> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.write().push(tx);
        rx
    }

    /// Change the poll cadence. Takes effect from the next tick.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<(), EngineError> {
        if interval.is_zero() {
            return Err(EngineError::Validation(
                "poll interval must be positive".to_string(),
            ));
        }
        *self.poll_interval.write() = interval;
        info!(interval_secs = interval.as_secs(), "poll interval updated");
        Ok(())
    }

    /// Manually pin an observed price and publish it immediately.
    pub async fn force_price(&self, symbol: &str, usd: f64) -> Result<TransactionId, EngineError> {
        let symbol = normalize_symbol(symbol)?;
        if !self.assets.contains_key(&symbol) {
            return Err(EngineError::NotFound(format!(
                "asset '{symbol}' is not tracked"
            )));
        }
        let value = scale_usd(usd).ok_or_else(|| {
            EngineError::Validation(format!("price {usd} is not representable"))
        })?;

        self.record_observation(&symbol, value, "manual");

        let batch = vec![PricePublish {
            asset: symbol.clone(),
            value,
        }];
        let tx_id = self.publish_batch(&batch).await?;
        info!(symbol = %symbol, value, tx = %tx_id, "price forced on-ledger");
        Ok(tx_id)
    }

    /// Poll loop body: fetch observed prices, update the cache, publish
    /// whatever is due.
    ///
    /// Never returns an error: a failed market-data fetch skips this
    /// cycle's publish decision and a failed publish batch leaves its
    /// assets' `last_published` untouched, so both retry on the next tick.
    #[instrument(skip(self))]
    pub async fn poll(&self) {
        let symbols: Vec<String> = self.assets.iter().map(|e| e.key().clone()).collect();
        if symbols.is_empty() {
            return;
        }

        if let Err(e) = self.refresh_observations(&symbols).await {
            warn!(error = %e, "market data fetch failed, skipping publish decision this cycle");
            return;
        }

        let due = self.publishable();
        if due.is_empty() {
            debug!(tracked = symbols.len(), "no publications due");
            return;
        }

        info!(due = due.len(), "publishing price updates");
        // The config loader clamps the limit; the max(1) covers directly
        // constructed configs, since chunks panics on zero.
        for batch in due.chunks(self.config.publish_batch_limit.max(1)) {
            match self.publish_batch(batch).await {
                Ok(tx_id) => {
                    debug!(tx = %tx_id, count = batch.len(), "price batch published");
                }
                Err(e) => {
                    // last_published stays untouched for the whole batch;
                    // the same assets come due again next poll.
                    warn!(error = %e, count = batch.len(), "price batch failed, will retry next poll");
                }
            }
        }
    }

    /// Drive `poll` on the configured cadence forever.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.poll().await;
            let interval = *self.poll_interval.read();
            tokio::time::sleep(interval).await;
        }
    }

    /// Fetch the provider's prices for the tracked symbols and fold them
    /// into the observed cache.
    async fn refresh_observations(&self, symbols: &[String]) -> Result<(), EngineError> {
        let fetched = self.market.fetch_prices(symbols).await?;

        for symbol in symbols {
            let Some(&usd) = fetched.get(symbol) else {
                debug!(symbol = %symbol, "provider returned no price");
                continue;
            };
            match scale_usd(usd) {
                Some(value) => self.record_observation(symbol, value, "market-data"),
                None => warn!(symbol = %symbol, usd, "discarding unrepresentable price"),
            }
        }
        Ok(())
    }

    pub(crate) fn record_observation(&self, symbol: &str, value: u64, source: &str) {
        self.observed.insert(
            symbol.to_string(),
            ObservedPrice {
                value,
                observed_at: Utc::now(),
                source: source.to_string(),
            },
        );
    }

    /// Assets whose ledger copy is due for refresh, ordered by symbol so
    /// batch composition is deterministic.
    fn publishable(&self) -> Vec<PricePublish> {
        let now = Utc::now();
        let max_stale = chrono::Duration::from_std(self.config.max_stale())
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut due: Vec<PricePublish> = self
            .assets
            .iter()
            .filter_map(|entry| {
                let symbol = entry.key();
                let observed = self.observed.get(symbol)?;
                let needed = match self.published.get(symbol) {
                    None => true,
                    Some(published) => {
                        change_bps(published.value, observed.value)
                            >= self.config.change_threshold_bps as u128
                            || now - published.published_at >= max_stale
                    }
                };
                needed.then(|| PricePublish {
                    asset: symbol.clone(),
                    value: observed.value,
                })
            })
            .collect();
        due.sort_by(|a, b| a.asset.cmp(&b.asset));
        due
    }

    /// Submit one batch through the queue; on success update
    /// `last_published` and notify subscribers for every asset in it
    /// before returning (and therefore before any next batch).
    async fn publish_batch(&self, batch: &[PricePublish]) -> Result<TransactionId, EngineError> {
        let ledger = self.ledger.clone();
        let payload: SmallVec<[PricePublish; 4]> = batch.iter().cloned().collect();
        let tx_id = self
            .queue
            .submit(move || async move { ledger.publish_prices(&payload).await })
            .await?;

        let published_at = Utc::now();
        for item in batch {
            self.published.insert(
                item.asset.clone(),
                PublishedPrice {
                    value: item.value,
                    published_at,
                },
            );
            self.notify(PriceUpdate {
                symbol: item.asset.clone(),
                value: item.value,
                published_at,
            })
            .await;
        }

        Ok(tx_id)
    }

    async fn notify(&self, update: PriceUpdate) {
        let senders: Vec<mpsc::Sender<PriceUpdate>> = self.subscribers.read().clone();
        let mut closed = false;
        for sender in &senders {
            if sender.send(update.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.subscribers.write().retain(|s| !s.is_closed());
        }
    }
}

/// Scale a USD float to the 10^4 fixed-point wire value.
fn scale_usd(usd: f64) -> Option<u64> {
    if !usd.is_finite() || usd <= 0.0 {
        return None;
    }
    let scaled = (usd * 10_000.0).round();
    if scaled > u64::MAX as f64 {
        return None;
    }
    Some(scaled as u64)
}

/// Absolute price change in basis points relative to `old`.
fn change_bps(old: u64, new: u64) -> u128 {
    if old == 0 {
        return u128::MAX;
    }
    old.abs_diff(new) as u128 * BPS_DENOMINATOR / old as u128
}
