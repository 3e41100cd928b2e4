//! Shared test doubles for the market-data and ledger boundaries.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use vigil_api::{MarketDataError, MarketDataSource};
use vigil_ledger::{
    Authorization, EscrowDescriptor, EscrowHandle, EscrowKind, LedgerClient, LedgerError,
    LiquidateCall, PoolPosition, PricePublish, TransactionId,
};

/// Scriptable market-data source.
pub struct MockMarket {
    prices: Mutex<HashMap<String, f64>>,
    failing: AtomicBool,
}

impl MockMarket {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_price(&self, symbol: &str, usd: f64) {
        self.prices.lock().insert(symbol.to_string(), usd);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketDataSource for MockMarket {
    async fn fetch_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, f64>, MarketDataError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MarketDataError::Status(503));
        }
        let prices = self.prices.lock();
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|&p| (s.clone(), p)))
            .collect())
    }
}

/// Scriptable ledger client recording every call it receives.
pub struct MockLedger {
    pub registered: Mutex<Vec<String>>,
    pub synced: Mutex<Vec<String>>,
    pub publishes: Mutex<Vec<Vec<PricePublish>>>,
    pub transfer_auths: Mutex<Vec<(String, String, u128)>>,
    pub burn_auths: Mutex<Vec<(String, u128)>>,
    pub liquidations: Mutex<Vec<(EscrowHandle, LiquidateCall)>>,
    /// Position returned by `get_collateral_and_debt`, keyed by escrow address.
    pub positions: Mutex<HashMap<String, PoolPosition>>,
    /// Escrow addresses whose position read fails.
    pub fail_position_for: Mutex<HashSet<String>>,
    fail_publish: AtomicBool,
    fail_liquidate: AtomicBool,
    next_nonce: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(Vec::new()),
            synced: Mutex::new(Vec::new()),
            publishes: Mutex::new(Vec::new()),
            transfer_auths: Mutex::new(Vec::new()),
            burn_auths: Mutex::new(Vec::new()),
            liquidations: Mutex::new(Vec::new()),
            positions: Mutex::new(HashMap::new()),
            fail_position_for: Mutex::new(HashSet::new()),
            fail_publish: AtomicBool::new(false),
            fail_liquidate: AtomicBool::new(false),
            next_nonce: AtomicU64::new(1),
        }
    }

    pub fn set_position(&self, escrow_address: &str, position: PoolPosition) {
        self.positions
            .lock()
            .insert(escrow_address.to_string(), position);
    }

    pub fn fail_position_reads_for(&self, escrow_address: &str) {
        self.fail_position_for
            .lock()
            .insert(escrow_address.to_string());
    }

    pub fn set_fail_publish(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }

    pub fn set_fail_liquidate(&self, failing: bool) {
        self.fail_liquidate.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn register_escrow(
        &self,
        address: &str,
        _kind: EscrowKind,
        _descriptor: &EscrowDescriptor,
        _credential: &str,
    ) -> Result<EscrowHandle, LedgerError> {
        self.registered.lock().push(address.to_string());
        Ok(EscrowHandle(format!("handle-{address}")))
    }

    async fn sync_private_state(&self, handle: &EscrowHandle) -> Result<(), LedgerError> {
        self.synced.lock().push(handle.0.clone());
        Ok(())
    }

    async fn get_collateral_and_debt(
        &self,
        _pool_address: &str,
        escrow_address: &str,
    ) -> Result<PoolPosition, LedgerError> {
        if self.fail_position_for.lock().contains(escrow_address) {
            return Err(LedgerError::Gateway {
                code: 500,
                message: "position read failed".to_string(),
            });
        }
        self.positions
            .lock()
            .get(escrow_address)
            .copied()
            .ok_or_else(|| LedgerError::InvalidResponse("no position scripted".to_string()))
    }

    async fn publish_prices(&self, batch: &[PricePublish]) -> Result<TransactionId, LedgerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(LedgerError::Gateway {
                code: 500,
                message: "publish failed".to_string(),
            });
        }
        self.publishes.lock().push(batch.to_vec());
        Ok(TransactionId(format!("tx-{}", self.publishes.lock().len())))
    }

    async fn create_transfer_authorization(
        &self,
        asset: &str,
        recipient: &str,
        amount: u128,
    ) -> Result<Authorization, LedgerError> {
        self.transfer_auths
            .lock()
            .push((asset.to_string(), recipient.to_string(), amount));
        Ok(Authorization {
            id: format!("auth-{asset}"),
            nonce: self.next_nonce.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn create_burn_authorization(
        &self,
        asset: &str,
        amount: u128,
    ) -> Result<Authorization, LedgerError> {
        self.burn_auths.lock().push((asset.to_string(), amount));
        Ok(Authorization {
            id: format!("auth-{asset}"),
            nonce: self.next_nonce.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn invoke_liquidate(
        &self,
        handle: &EscrowHandle,
        call: &LiquidateCall,
    ) -> Result<TransactionId, LedgerError> {
        if self.fail_liquidate.load(Ordering::SeqCst) {
            return Err(LedgerError::Simulation("liquidate reverted".to_string()));
        }
        self.liquidations.lock().push((handle.clone(), call.clone()));
        Ok(TransactionId(format!("tx-liq-{}", handle.0)))
    }
}
