//! Sweep orchestration.
//!
//! The sentinel owns the decision loop: on a fixed timer it sweeps every
//! tracked escrow, and on each published price update it sweeps the
//! escrows exposed to that asset. Per escrow it refreshes the on-ledger
//! position, accrues interest, evaluates the health factor against cached
//! prices and hands undercollateralized positions to the liquidator. One
//! escrow failing never stops a sweep.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use vigil_ledger::{
    EscrowDescriptor, EscrowHandle, EscrowKind, LedgerClient, PoolPosition, SerialQueue,
};

use crate::config::{EngineConfig, InterestConfig, SweepConfig};
use crate::error::EngineError;
use crate::executor::{LiquidationRequest, Liquidator};
use crate::math;
use crate::price_tracker::{normalize_symbol, PriceSnapshot, PriceTracker, PriceUpdate};
use crate::store::{CollateralPosition, PositionStore, TrackedEscrow};

/// Admin-facade parameters for registering an escrow.
#[derive(Debug, Clone)]
pub struct RegisterEscrowParams {
    pub address: String,
    /// "lending" or "stable".
    pub kind: String,
    pub pool_address: String,
    pub collateral_asset: String,
    pub debt_asset: String,
    /// Opaque registration credential forwarded to the ledger.
    pub credential: String,
}

/// Point-in-time view of the engine for the status facade.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub queue_depth: usize,
    pub last_full_sweep: Option<DateTime<Utc>>,
    pub tracked_escrows: usize,
    pub tracked_assets: usize,
    pub positions: usize,
    pub prices: Vec<PriceSnapshot>,
}

/// Drives sweeps over tracked escrows and dispatches liquidations.
pub struct Sentinel {
    store: Arc<PositionStore>,
    tracker: Arc<PriceTracker>,
    liquidator: Arc<Liquidator>,
    ledger: Arc<dyn LedgerClient>,
    queue: Arc<SerialQueue>,
    /// Ledger handles obtained lazily on first evaluation of each escrow.
    handles: DashMap<String, EscrowHandle>,
    last_full_sweep: RwLock<Option<DateTime<Utc>>>,
    sweep: SweepConfig,
    interest: InterestConfig,
    max_ltv: u64,
}

impl Sentinel {
    pub fn new(
        store: Arc<PositionStore>,
        tracker: Arc<PriceTracker>,
        liquidator: Arc<Liquidator>,
        ledger: Arc<dyn LedgerClient>,
        queue: Arc<SerialQueue>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            liquidator,
            ledger,
            queue,
            handles: DashMap::new(),
            last_full_sweep: RwLock::new(None),
            sweep: config.sweep.clone(),
            interest: config.interest.clone(),
            max_ltv: config.risk.max_ltv,
        }
    }

    /// Register an escrow for monitoring. Validates and normalizes the
    /// parameters; the actual ledger registration happens lazily on the
    /// escrow's first evaluation.
    pub fn register_escrow(&self, params: RegisterEscrowParams) -> Result<TrackedEscrow, EngineError> {
        let address = params.address.trim().to_string();
        if address.is_empty() {
            return Err(EngineError::Validation(
                "escrow address must not be empty".to_string(),
            ));
        }
        let pool_address = params.pool_address.trim().to_string();
        if pool_address.is_empty() {
            return Err(EngineError::Validation(
                "pool address must not be empty".to_string(),
            ));
        }
        let kind = EscrowKind::from_str(&params.kind).map_err(EngineError::Validation)?;
        let collateral_asset = normalize_symbol(&params.collateral_asset)?;
        let debt_asset = normalize_symbol(&params.debt_asset)?;

        let escrow = TrackedEscrow {
            address: address.clone(),
            kind,
            pool_address,
            collateral_asset,
            debt_asset,
            credential: params.credential,
            registered_at: Utc::now(),
        };

        if self.store.register_escrow(escrow.clone()) {
            info!(
                escrow = %escrow.address,
                kind = %escrow.kind,
                collateral = %escrow.collateral_asset,
                debt = %escrow.debt_asset,
                "escrow registered for monitoring"
            );
        } else {
            debug!(escrow = %escrow.address, "escrow already registered, keeping first registration");
        }
        Ok(escrow)
    }

    /// Sweep every tracked escrow once.
    #[instrument(skip(self))]
    pub async fn full_sweep(&self) {
        let escrows = self.store.escrows();
        debug!(escrows = escrows.len(), "starting full sweep");

        let mut failures = 0usize;
        for escrow in &escrows {
            if let Err(e) = self.evaluate_escrow(escrow).await {
                failures += 1;
                warn!(
                    escrow = %escrow.address,
                    error = %e,
                    "escrow evaluation failed, continuing sweep"
                );
            }
        }

        *self.last_full_sweep.write() = Some(Utc::now());
        info!(
            escrows = escrows.len(),
            failures,
            "full sweep complete"
        );
    }

    /// Sweep only the escrows exposed to one asset, on either side.
    #[instrument(skip(self))]
    pub async fn partial_sweep(&self, symbol: &str) {
        let escrows = self.store.escrows_for_asset(symbol);
        if escrows.is_empty() {
            return;
        }
        debug!(symbol, escrows = escrows.len(), "price-driven partial sweep");

        for escrow in &escrows {
            if let Err(e) = self.evaluate_escrow(escrow).await {
                warn!(
                    escrow = %escrow.address,
                    error = %e,
                    "escrow evaluation failed, continuing sweep"
                );
            }
        }
    }

    /// Evaluate a single escrow by address. For the admin facade.
    pub async fn sweep_escrow(&self, address: &str) -> Result<(), EngineError> {
        let escrow = self
            .store
            .escrow(address)
            .ok_or_else(|| EngineError::NotFound(format!("escrow '{address}' is not tracked")))?;
        self.evaluate_escrow(&escrow).await
    }

    /// Trigger an immediate full sweep outside the timer cadence.
    pub async fn force_sweep(&self) {
        info!("full sweep forced");
        self.full_sweep().await;
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            queue_depth: self.queue.depth(),
            last_full_sweep: *self.last_full_sweep.read(),
            tracked_escrows: self.store.escrow_count(),
            tracked_assets: self.tracker.asset_count(),
            positions: self.store.position_count(),
            prices: self.tracker.snapshots(),
        }
    }

    /// Run the sweep loops: a timer-driven full sweep plus a price-driven
    /// partial sweep for every published update.
    pub async fn run(self: Arc<Self>, mut price_rx: mpsc::Receiver<PriceUpdate>) {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.sweep.full_sweep_interval());
            loop {
                ticker.tick().await;
                sweeper.full_sweep().await;
            }
        });

        while let Some(update) = price_rx.recv().await {
            debug!(symbol = %update.symbol, value = update.value, "price update received");
            self.partial_sweep(&update.symbol).await;
        }
        info!("price update channel closed, sentinel stopping");
    }

    /// Evaluate one escrow: refresh its position, accrue interest, check
    /// health, liquidate if undercollateralized.
    async fn evaluate_escrow(&self, escrow: &TrackedEscrow) -> Result<(), EngineError> {
        let handle = self.ensure_registered(escrow).await?;

        let (position, total_debt) = self.refresh_position(escrow, &handle).await?;

        self.store.upsert_position(CollateralPosition {
            escrow_address: escrow.address.clone(),
            collateral_asset: escrow.collateral_asset.clone(),
            collateral_amount: position.collateral_amount,
            debt_asset: escrow.debt_asset.clone(),
            debt_amount: total_debt,
            pool_id: escrow.pool_address.clone(),
            last_updated: Utc::now(),
        });

        if total_debt == 0 {
            debug!(escrow = %escrow.address, "no outstanding debt, skipping");
            return Ok(());
        }

        let (Some(collateral_price), Some(debt_price)) = (
            self.tracker.cached_price(&escrow.collateral_asset),
            self.tracker.cached_price(&escrow.debt_asset),
        ) else {
            info!(
                escrow = %escrow.address,
                collateral = %escrow.collateral_asset,
                debt = %escrow.debt_asset,
                "price cache incomplete, deferring evaluation to next cycle"
            );
            return Ok(());
        };

        let health = math::health_factor(
            debt_price,
            total_debt,
            collateral_price,
            position.collateral_amount,
            self.max_ltv,
        );

        if !math::is_liquidatable(health) {
            debug!(escrow = %escrow.address, health, "position healthy");
            return Ok(());
        }

        warn!(
            escrow = %escrow.address,
            health,
            total_debt,
            collateral_amount = position.collateral_amount,
            "position undercollateralized, dispatching liquidation"
        );

        let outcome = self
            .liquidator
            .liquidate(LiquidationRequest {
                escrow_address: escrow.address.clone(),
                kind: escrow.kind,
                handle,
                pool_address: escrow.pool_address.clone(),
                collateral_asset: escrow.collateral_asset.clone(),
                debt_asset: escrow.debt_asset.clone(),
                collateral_amount: position.collateral_amount,
                total_debt,
                collateral_price,
                debt_price,
            })
            .await;

        // The outcome is already logged by the executor; a failed attempt
        // does not fail the sweep, the position is retried next cycle.
        if let Some(tx_id) = outcome.transaction_id {
            info!(escrow = %escrow.address, tx = %tx_id, "liquidation settled");
        }
        Ok(())
    }

    /// Look up the escrow's ledger handle, registering it on first use.
    async fn ensure_registered(&self, escrow: &TrackedEscrow) -> Result<EscrowHandle, EngineError> {
        if let Some(handle) = self.handles.get(&escrow.address) {
            return Ok(handle.clone());
        }

        let ledger = self.ledger.clone();
        let address = escrow.address.clone();
        let kind = escrow.kind;
        let descriptor = EscrowDescriptor {
            pool_address: escrow.pool_address.clone(),
            collateral_asset: escrow.collateral_asset.clone(),
            debt_asset: escrow.debt_asset.clone(),
        };
        let credential = escrow.credential.clone();

        let handle = self
            .queue
            .submit(move || async move {
                ledger
                    .register_escrow(&address, kind, &descriptor, &credential)
                    .await
            })
            .await?;

        info!(escrow = %escrow.address, handle = %handle, "escrow registered on-ledger");
        self.handles.insert(escrow.address.clone(), handle.clone());
        Ok(handle)
    }

    /// Refresh the client's private state, read the position and accrue
    /// interest, all in one queue slot so the read sees the fresh sync.
    async fn refresh_position(
        &self,
        escrow: &TrackedEscrow,
        handle: &EscrowHandle,
    ) -> Result<(PoolPosition, u128), EngineError> {
        let ledger = self.ledger.clone();
        let handle = handle.clone();
        let pool_address = escrow.pool_address.clone();
        let address = escrow.address.clone();
        // Clamped at config load too; guards directly constructed configs
        // against dividing by zero below.
        let epoch_duration = self.interest.epoch_duration_secs.max(1);
        let rate = self.interest.borrow_rate_tenths_pct;
        let now_secs = Utc::now().timestamp().max(0) as u64;

        let result = self
            .queue
            .submit(move || async move {
                ledger.sync_private_state(&handle).await?;
                let position = ledger.get_collateral_and_debt(&pool_address, &address).await?;

                let current_epoch = now_secs / epoch_duration;
                let interest = math::accrued_interest(
                    position.debt_principal,
                    position.debt_start_epoch,
                    current_epoch,
                    epoch_duration,
                    rate,
                );
                Ok((position, position.debt_principal.saturating_add(interest)))
            })
            .await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceConfig;
    use crate::math::WAD;
    use crate::testutil::{MockLedger, MockMarket};
    use std::time::Duration;

    struct Fixture {
        sentinel: Arc<Sentinel>,
        ledger: Arc<MockLedger>,
        tracker: Arc<PriceTracker>,
        store: Arc<PositionStore>,
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::default())
    }

    fn fixture_with(config: EngineConfig) -> Fixture {
        let ledger: Arc<MockLedger> = Arc::new(MockLedger::new());
        let queue = Arc::new(SerialQueue::new(Duration::from_millis(1)));
        let store = Arc::new(PositionStore::new());
        let tracker = Arc::new(PriceTracker::new(
            Arc::new(MockMarket::new()),
            ledger.clone(),
            queue.clone(),
            PriceConfig::default(),
        ));
        let liquidator = Arc::new(Liquidator::new(ledger.clone(), queue.clone()));
        let sentinel = Arc::new(Sentinel::new(
            store.clone(),
            tracker.clone(),
            liquidator,
            ledger.clone(),
            queue,
            &config,
        ));
        Fixture {
            sentinel,
            ledger,
            tracker,
            store,
        }
    }

    fn params(address: &str) -> RegisterEscrowParams {
        RegisterEscrowParams {
            address: address.to_string(),
            kind: "lending".to_string(),
            pool_address: "pool-1".to_string(),
            collateral_asset: "BTC".to_string(),
            debt_asset: "USDN".to_string(),
            credential: "cred".to_string(),
        }
    }

    fn current_epoch_position(collateral: u128, principal: u128) -> PoolPosition {
        // Start epoch set to now so no interest accrues in the test.
        let epoch = Utc::now().timestamp().max(0) as u64 / 900;
        PoolPosition {
            collateral_amount: collateral,
            debt_principal: principal,
            debt_start_epoch: epoch,
        }
    }

    #[tokio::test]
    async fn register_escrow_validates_inputs() {
        let f = fixture();

        let mut bad_kind = params("esc-1");
        bad_kind.kind = "margin".to_string();
        assert!(matches!(
            f.sentinel.register_escrow(bad_kind),
            Err(EngineError::Validation(_))
        ));

        let mut bad_symbol = params("esc-1");
        bad_symbol.collateral_asset = "not a symbol".to_string();
        assert!(matches!(
            f.sentinel.register_escrow(bad_symbol),
            Err(EngineError::Validation(_))
        ));

        let mut empty_address = params("");
        empty_address.address = "   ".to_string();
        assert!(matches!(
            f.sentinel.register_escrow(empty_address),
            Err(EngineError::Validation(_))
        ));

        let escrow = f.sentinel.register_escrow(params("esc-1")).unwrap();
        assert_eq!(escrow.kind, EscrowKind::Lending);
        assert_eq!(escrow.collateral_asset, "BTC");
        assert_eq!(f.store.escrow_count(), 1);
    }

    #[tokio::test]
    async fn undercollateralized_escrow_is_liquidated() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-1")).unwrap();
        // 10 WAD collateral, 9 WAD debt, both at $1.00, 75% LTV: health
        // factor 83_333, below threshold.
        f.ledger
            .set_position("esc-1", current_epoch_position(10 * WAD, 9 * WAD));
        f.tracker.record_observation("BTC", 10_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.full_sweep().await;

        let calls = f.ledger.liquidations.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.repay_amount, 9 * WAD * 49 / 100);

        // Position persisted from the sweep.
        let position = f.store.position("esc-1").unwrap();
        assert_eq!(position.debt_amount, 9 * WAD);
        assert_eq!(position.collateral_amount, 10 * WAD);
    }

    #[tokio::test]
    async fn healthy_escrow_is_left_alone() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-1")).unwrap();
        f.ledger
            .set_position("esc-1", current_epoch_position(10 * WAD, 5 * WAD));
        f.tracker.record_observation("BTC", 10_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.full_sweep().await;

        assert!(f.ledger.liquidations.lock().is_empty());
        assert_eq!(f.store.position("esc-1").unwrap().debt_amount, 5 * WAD);
    }

    #[tokio::test]
    async fn zero_debt_escrow_is_skipped_but_persisted() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-1")).unwrap();
        f.ledger
            .set_position("esc-1", current_epoch_position(10 * WAD, 0));
        f.tracker.record_observation("BTC", 10_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.full_sweep().await;

        assert!(f.ledger.liquidations.lock().is_empty());
        assert_eq!(f.store.position("esc-1").unwrap().debt_amount, 0);
    }

    #[tokio::test]
    async fn missing_price_defers_evaluation_without_failing() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-1")).unwrap();
        f.ledger
            .set_position("esc-1", current_epoch_position(10 * WAD, 9 * WAD));
        // Only the collateral price is cached.
        f.tracker.record_observation("BTC", 10_000, "market-data");

        f.sentinel.sweep_escrow("esc-1").await.unwrap();

        assert!(f.ledger.liquidations.lock().is_empty());
        // The position itself was still refreshed and stored.
        assert!(f.store.position("esc-1").is_some());
    }

    #[tokio::test]
    async fn zero_epoch_duration_does_not_panic() {
        let mut config = EngineConfig::default();
        config.interest.epoch_duration_secs = 0;
        let f = fixture_with(config);

        f.sentinel.register_escrow(params("esc-1")).unwrap();
        // Start epoch in the future relative to any clamped epoch count,
        // so no interest accrues and the debt is the bare principal.
        f.ledger.set_position(
            "esc-1",
            PoolPosition {
                collateral_amount: 10 * WAD,
                debt_principal: 5 * WAD,
                debt_start_epoch: u64::MAX,
            },
        );
        f.tracker.record_observation("BTC", 10_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.sweep_escrow("esc-1").await.unwrap();

        assert_eq!(f.store.position("esc-1").unwrap().debt_amount, 5 * WAD);
    }

    #[tokio::test]
    async fn one_failing_escrow_does_not_stop_the_sweep() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-a")).unwrap();
        f.sentinel.register_escrow(params("esc-b")).unwrap();

        f.ledger.fail_position_reads_for("esc-a");
        f.ledger
            .set_position("esc-b", current_epoch_position(10 * WAD, 9 * WAD));
        f.tracker.record_observation("BTC", 10_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.full_sweep().await;

        // esc-b was evaluated and liquidated despite esc-a's failure.
        let calls = f.ledger.liquidations.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0 .0, "handle-esc-b");
    }

    #[tokio::test]
    async fn ledger_registration_happens_once_per_escrow() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-1")).unwrap();
        f.ledger
            .set_position("esc-1", current_epoch_position(10 * WAD, 5 * WAD));
        f.tracker.record_observation("BTC", 10_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.sweep_escrow("esc-1").await.unwrap();
        f.sentinel.sweep_escrow("esc-1").await.unwrap();

        assert_eq!(f.ledger.registered.lock().clone(), vec!["esc-1"]);
        // Both sweeps synced state through the cached handle.
        assert_eq!(f.ledger.synced.lock().len(), 2);
    }

    #[tokio::test]
    async fn partial_sweep_only_touches_exposed_escrows() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-1")).unwrap();
        let mut eth = params("esc-2");
        eth.collateral_asset = "ETH".to_string();
        f.sentinel.register_escrow(eth).unwrap();

        f.ledger
            .set_position("esc-2", current_epoch_position(10 * WAD, 5 * WAD));
        f.tracker.record_observation("ETH", 20_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.partial_sweep("ETH").await;

        // esc-1 (BTC collateral, USDN debt) was not evaluated.
        assert!(f.store.position("esc-1").is_none());
        assert!(f.store.position("esc-2").is_some());
    }

    #[tokio::test]
    async fn sweep_escrow_rejects_unknown_addresses() {
        let f = fixture();
        let err = f.sentinel.sweep_escrow("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_reflects_engine_state() {
        let f = fixture();
        f.sentinel.register_escrow(params("esc-1")).unwrap();
        f.tracker.track("BTC", "Bitcoin").unwrap();
        f.ledger
            .set_position("esc-1", current_epoch_position(10 * WAD, 5 * WAD));
        f.tracker.record_observation("BTC", 10_000, "market-data");
        f.tracker.record_observation("USDN", 10_000, "market-data");

        f.sentinel.full_sweep().await;
        let status = f.sentinel.status();

        assert_eq!(status.tracked_escrows, 1);
        assert_eq!(status.tracked_assets, 1);
        assert_eq!(status.positions, 1);
        assert!(status.last_full_sweep.is_some());
        assert_eq!(status.queue_depth, 0);
    }
}
