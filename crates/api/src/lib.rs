//! API client for the external market-data provider.
//!
//! This crate provides the HTTP client the price tracker polls for
//! observed USD prices, plus the `MarketDataSource` trait the engine
//! consumes so tests can substitute a stub feed.

mod market;

pub use market::{MarketDataClient, MarketDataError, MarketDataSource};
