//! In-memory storage of tracked escrows and derived positions.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

use vigil_ledger::EscrowKind;

/// An escrow registered for monitoring. Lives for the process lifetime:
/// escrows are only ever added, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEscrow {
    /// Escrow contract address (key).
    pub address: String,
    pub kind: EscrowKind,
    pub pool_address: String,
    /// Symbol of the collateral asset.
    pub collateral_asset: String,
    /// Symbol of the debt asset.
    pub debt_asset: String,
    /// Opaque registration credential forwarded to the ledger.
    pub credential: String,
    pub registered_at: DateTime<Utc>,
}

/// Denormalized view of one escrow's position, recomputed every sweep.
/// Not authoritative: the ledger is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralPosition {
    pub escrow_address: String,
    pub collateral_asset: String,
    /// WAD.
    pub collateral_amount: u128,
    pub debt_asset: String,
    /// Principal plus accrued interest, WAD.
    pub debt_amount: u128,
    pub pool_id: String,
    pub last_updated: DateTime<Utc>,
}

/// Indexed storage of escrows and positions.
///
/// The collateral-asset secondary index is maintained on every position
/// write: a position moving to a different collateral asset is removed
/// from its old bucket, and buckets left empty are pruned.
pub struct PositionStore {
    escrows: DashMap<String, TrackedEscrow>,
    positions: DashMap<String, CollateralPosition>,
    /// collateral asset symbol -> escrow addresses holding it
    by_collateral: DashMap<String, DashSet<String>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            escrows: DashMap::new(),
            positions: DashMap::new(),
            by_collateral: DashMap::new(),
        }
    }

    /// Register an escrow. Idempotent: a second registration of the same
    /// address is a no-op and returns false.
    pub fn register_escrow(&self, escrow: TrackedEscrow) -> bool {
        match self.escrows.entry(escrow.address.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(escrow);
                true
            }
        }
    }

    pub fn escrow(&self, address: &str) -> Option<TrackedEscrow> {
        self.escrows.get(address).map(|e| e.clone())
    }

    pub fn escrows(&self) -> Vec<TrackedEscrow> {
        self.escrows.iter().map(|e| e.value().clone()).collect()
    }

    pub fn escrow_count(&self) -> usize {
        self.escrows.len()
    }

    /// Escrows whose collateral or debt asset matches `symbol`. Used for
    /// the price-driven partial sweep.
    pub fn escrows_for_asset(&self, symbol: &str) -> Vec<TrackedEscrow> {
        self.escrows
            .iter()
            .filter(|e| e.collateral_asset == symbol || e.debt_asset == symbol)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Insert or overwrite the position for an escrow, keeping the
    /// collateral-asset index consistent.
    pub fn upsert_position(&self, position: CollateralPosition) {
        let address = position.escrow_address.clone();
        let new_asset = position.collateral_asset.clone();

        let previous = self.positions.insert(address.clone(), position);

        if let Some(prev) = previous {
            if prev.collateral_asset != new_asset {
                self.unindex(&prev.collateral_asset, &address);
            }
        }

        self.by_collateral
            .entry(new_asset)
            .or_default()
            .insert(address);
    }

    pub fn position(&self, address: &str) -> Option<CollateralPosition> {
        self.positions.get(address).map(|p| p.clone())
    }

    pub fn positions(&self) -> Vec<CollateralPosition> {
        self.positions.iter().map(|p| p.value().clone()).collect()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Positions backed by a collateral asset, paginated. Results are
    /// ordered by escrow address so pages are stable between calls.
    pub fn positions_by_collateral(
        &self,
        symbol: &str,
        offset: usize,
        limit: usize,
    ) -> Vec<CollateralPosition> {
        let mut addresses: Vec<String> = match self.by_collateral.get(symbol) {
            Some(bucket) => bucket.iter().map(|a| a.clone()).collect(),
            None => return Vec::new(),
        };
        addresses.sort();

        addresses
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|addr| self.position(&addr))
            .collect()
    }

    fn unindex(&self, asset: &str, address: &str) {
        let mut prune = false;
        if let Some(bucket) = self.by_collateral.get(asset) {
            bucket.remove(address);
            prune = bucket.is_empty();
        }
        if prune {
            // Re-check under the removal to avoid racing a concurrent insert.
            self.by_collateral
                .remove_if(asset, |_, bucket| bucket.is_empty());
        }
    }
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}
