//! Ledger settlement boundary for the liquidation engine.
//!
//! This crate provides:
//! - Domain types shared with the settlement layer (escrows, authorizations,
//!   price publications, liquidate calls)
//! - The `LedgerClient` trait: the narrow operation-submission and
//!   position-query interface the engine is allowed to touch
//! - A JSON gateway implementation of `LedgerClient` for the binary
//! - The serialization queue that guarantees single-flight access to the
//!   ledger client's local persistent store

mod error;
mod gateway;
mod queue;
mod types;

pub use error::LedgerError;
pub use gateway::LedgerGateway;
pub use queue::SerialQueue;
pub use types::{
    Authorization, EscrowDescriptor, EscrowHandle, EscrowKind, LedgerClient, LiquidateCall,
    PoolPosition, PricePublish, TransactionId,
};
