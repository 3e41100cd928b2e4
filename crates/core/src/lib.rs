//! Liquidation engine core.
//!
//! This crate provides the engine that keeps collateralized debt positions
//! solvent-or-liquidated:
//! - Fixed-point interest accrual and health factor math
//! - In-memory store of tracked escrows and derived positions
//! - Asset price tracking with throttled on-ledger publication
//! - Partial-liquidation execution through the serialization queue
//! - Sentinel sweep orchestration (timer-driven and price-driven)
//!
//! All ledger access goes through `vigil_ledger::SerialQueue`; nothing in
//! this crate talks to the settlement client directly.

pub mod config;
mod error;
mod executor;
pub mod math;
mod price_tracker;
mod sentinel;
mod store;
#[cfg(test)]
pub(crate) mod testutil;

pub use config::{
    config, init_config, EngineConfig, InterestConfig, PriceConfig, QueueConfig, RiskConfig,
    SweepConfig,
};
pub use error::EngineError;
pub use executor::{LiquidationOutcome, LiquidationRequest, Liquidator};
pub use price_tracker::{Asset, ObservedPrice, PriceSnapshot, PriceTracker, PriceUpdate, PublishedPrice};
pub use sentinel::{RegisterEscrowParams, Sentinel, StatusSnapshot};
pub use store::{CollateralPosition, PositionStore, TrackedEscrow};
