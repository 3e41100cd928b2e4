//! Partial liquidation execution.
//!
//! Builds the authorization + liquidate pair for an undercollateralized
//! escrow and submits it through the serialization queue as one unit, so
//! no other ledger operation runs between minting the authorization and
//! consuming its nonce.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};

use vigil_ledger::{
    EscrowHandle, EscrowKind, LedgerClient, LiquidateCall, SerialQueue, TransactionId,
};

use crate::math::{self, BonusSplit};

/// Everything the executor needs to liquidate one escrow. Assembled by the
/// sentinel from the store, the position read and the price cache.
#[derive(Debug, Clone)]
pub struct LiquidationRequest {
    pub escrow_address: String,
    pub kind: EscrowKind,
    pub handle: EscrowHandle,
    pub pool_address: String,
    pub collateral_asset: String,
    pub debt_asset: String,
    /// WAD.
    pub collateral_amount: u128,
    /// Principal plus accrued interest, WAD.
    pub total_debt: u128,
    /// USD scaled by 10^4.
    pub collateral_price: u64,
    /// USD scaled by 10^4.
    pub debt_price: u64,
}

/// Result of one liquidation attempt. Failures are data, not errors:
/// a sweep keeps going whatever happened here.
#[derive(Debug, Clone)]
pub struct LiquidationOutcome {
    pub escrow_address: String,
    pub success: bool,
    pub transaction_id: Option<TransactionId>,
    pub error: Option<String>,
    /// WAD.
    pub repay_amount: u128,
    pub duration_ms: u64,
}

/// Executes partial liquidations against the ledger.
pub struct Liquidator {
    ledger: Arc<dyn LedgerClient>,
    queue: Arc<SerialQueue>,
}

impl Liquidator {
    pub fn new(ledger: Arc<dyn LedgerClient>, queue: Arc<SerialQueue>) -> Self {
        Self { ledger, queue }
    }

    /// Liquidate one escrow. Never returns an error: any failure is folded
    /// into the outcome so the caller's sweep continues unconditionally.
    #[instrument(skip(self, request), fields(escrow = %request.escrow_address, kind = %request.kind))]
    pub async fn liquidate(&self, request: LiquidationRequest) -> LiquidationOutcome {
        let started = Instant::now();
        let repay = math::repay_amount(request.total_debt);

        if repay == 0 {
            warn!(
                escrow = %request.escrow_address,
                total_debt = request.total_debt,
                "repay amount rounds to zero, not submitting"
            );
            return LiquidationOutcome {
                escrow_address: request.escrow_address,
                success: false,
                transaction_id: None,
                error: Some("repay amount rounds to zero".to_string()),
                repay_amount: 0,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }

        let split: BonusSplit =
            math::seizure(repay, request.debt_price, request.collateral_price);
        info!(
            escrow = %request.escrow_address,
            kind = %request.kind,
            repay_amount = repay,
            total_debt = request.total_debt,
            seized_collateral = split.total_seized,
            liquidator_amount = split.liquidator_amount,
            protocol_fee = split.protocol_fee,
            "submitting partial liquidation"
        );

        let ledger = self.ledger.clone();
        let kind = request.kind;
        let handle = request.handle.clone();
        let pool_address = request.pool_address.clone();
        let debt_asset = request.debt_asset.clone();
        let collateral_price = request.collateral_price;
        let debt_price = request.debt_price;

        // Authorization and invocation run back to back inside one queue
        // slot; the nonce minted by the authorization is consumed by the
        // very next ledger operation.
        let result = self
            .queue
            .submit(move || async move {
                let (authorization, debt_price) = match kind {
                    EscrowKind::Lending => {
                        let auth = ledger
                            .create_transfer_authorization(&debt_asset, &pool_address, repay)
                            .await?;
                        (auth, Some(debt_price))
                    }
                    EscrowKind::Stable => {
                        let auth = ledger.create_burn_authorization(&debt_asset, repay).await?;
                        (auth, None)
                    }
                };

                let call = LiquidateCall {
                    repay_amount: repay,
                    nonce: authorization.nonce,
                    collateral_price,
                    debt_price,
                };
                ledger.invoke_liquidate(&handle, &call).await
            })
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(tx_id) => {
                info!(
                    escrow = %request.escrow_address,
                    tx = %tx_id,
                    repay_amount = repay,
                    duration_ms,
                    "liquidation confirmed"
                );
                LiquidationOutcome {
                    escrow_address: request.escrow_address,
                    success: true,
                    transaction_id: Some(tx_id),
                    error: None,
                    repay_amount: repay,
                    duration_ms,
                }
            }
            Err(e) => {
                error!(
                    escrow = %request.escrow_address,
                    kind = %request.kind,
                    repay_amount = repay,
                    total_debt = request.total_debt,
                    duration_ms,
                    retryable = e.is_retryable(),
                    error = %e,
                    "liquidation failed"
                );
                LiquidationOutcome {
                    escrow_address: request.escrow_address,
                    success: false,
                    transaction_id: None,
                    error: Some(e.to_string()),
                    repay_amount: repay,
                    duration_ms,
                }
            }
        }
    }
}
