//! Engine error taxonomy.

use thiserror::Error;
use vigil_api::MarketDataError;
use vigil_ledger::LedgerError;

/// Errors returned by engine operations.
///
/// `Validation`, `NotFound` and `Capacity` are rejected synchronously to
/// the administrative caller and never enter the serialization queue.
/// `Ledger` and `MarketData` wrap external-call failures; the loops catch
/// those at their boundary and retry the affected asset or escrow on the
/// next cycle. `Computation` exists for defensive checks in the fixed-point
/// math and should not occur in practice.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("ledger call failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("market data call failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("computation error: {0}")]
    Computation(String),
}

impl EngineError {
    /// Whether the administrative façade should map this to a client-error
    /// response with a readable reason. Everything else becomes an opaque
    /// server error, with full diagnostics only in logs.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::Capacity(_)
        )
    }
}
