//! Error type for ledger gateway calls.

use thiserror::Error;

/// Errors surfaced by the ledger client boundary.
///
/// Everything here is an external-call failure from the engine's point of
/// view: the affected escrow or price batch is retried on a later cycle.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected request ({code}): {message}")]
    Gateway { code: u16, message: String },

    #[error("transaction simulation reverted: {0}")]
    Simulation(String),

    #[error("malformed gateway response: {0}")]
    InvalidResponse(String),

    #[error("serialization queue closed")]
    QueueClosed,
}

impl LedgerError {
    /// Whether the operation may succeed if resubmitted unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Gateway { code: 500..=599, .. })
    }
}
