//! Domain types shared with the settlement layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Escrow contract flavor. Determines which authorization the liquidate
/// call needs and which prices it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowKind {
    /// Collateralized loan escrow: liquidation repays the debt asset into
    /// the pool via a transfer authorization.
    Lending,
    /// Stablecoin escrow: liquidation burns the stable asset via a burn
    /// authorization.
    Stable,
}

impl EscrowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lending => "lending",
            Self::Stable => "stable",
        }
    }
}

impl std::str::FromStr for EscrowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lending" => Ok(Self::Lending),
            "stable" => Ok(Self::Stable),
            other => Err(format!("unknown escrow kind '{other}'")),
        }
    }
}

impl std::fmt::Display for EscrowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of an escrow handed to the ledger at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowDescriptor {
    /// Pool contract the escrow borrows from.
    pub pool_address: String,
    /// Symbol of the collateral asset locked in the escrow.
    pub collateral_asset: String,
    /// Symbol of the borrowed asset.
    pub debt_asset: String,
}

/// Opaque handle returned by escrow registration; required by every later
/// call touching that escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowHandle(pub String);

impl std::fmt::Display for EscrowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction identifier assigned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-ledger position read for one escrow within a pool.
///
/// Amounts are 18-decimal fixed point (WAD). The ledger is authoritative;
/// this struct is a point-in-time read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolPosition {
    pub collateral_amount: u128,
    pub debt_principal: u128,
    pub debt_start_epoch: u64,
}

/// One asset price in a publish batch. `value` is USD scaled by 10^4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePublish {
    pub asset: String,
    pub value: u64,
}

/// Spend authorization minted by the ledger ahead of a liquidate call.
/// The nonce ties the authorization to the invocation that consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub id: String,
    pub nonce: u64,
}

/// Parameters for an escrow liquidate invocation.
///
/// Lending escrows verify both prices; stable escrows only the collateral
/// price, so `debt_price` is absent for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidateCall {
    pub repay_amount: u128,
    pub nonce: u64,
    pub collateral_price: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_price: Option<u64>,
}

/// The narrow interface the engine consumes from the settlement client.
///
/// Implementations own transaction building, simulation and submission.
/// Every method is an await point; callers serialize access through
/// [`crate::SerialQueue`] because the client's local persistent store is
/// not reentrant.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Register an escrow for monitoring. Idempotent on the ledger side:
    /// re-registering an address yields the same handle.
    async fn register_escrow(
        &self,
        address: &str,
        kind: EscrowKind,
        descriptor: &EscrowDescriptor,
        credential: &str,
    ) -> Result<EscrowHandle, LedgerError>;

    /// Refresh the client's private state for the escrow.
    async fn sync_private_state(&self, handle: &EscrowHandle) -> Result<(), LedgerError>;

    /// Read collateral and debt for an escrow within a pool.
    async fn get_collateral_and_debt(
        &self,
        pool_address: &str,
        escrow_address: &str,
    ) -> Result<PoolPosition, LedgerError>;

    /// Publish a batch of asset prices on-ledger.
    async fn publish_prices(&self, batch: &[PricePublish]) -> Result<TransactionId, LedgerError>;

    /// Mint a transfer authorization (liquidator -> recipient).
    async fn create_transfer_authorization(
        &self,
        asset: &str,
        recipient: &str,
        amount: u128,
    ) -> Result<Authorization, LedgerError>;

    /// Mint a burn authorization for a stable asset.
    async fn create_burn_authorization(
        &self,
        asset: &str,
        amount: u128,
    ) -> Result<Authorization, LedgerError>;

    /// Invoke the escrow's liquidate operation and wait for confirmation.
    async fn invoke_liquidate(
        &self,
        handle: &EscrowHandle,
        call: &LiquidateCall,
    ) -> Result<TransactionId, LedgerError>;
}
