//! Market-data provider client.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from the market-data boundary.
///
/// A failed fetch never crashes the poll loop: the tracker skips that
/// cycle's publish decision and retries on the next tick.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// Source of observed USD prices for tracked symbols.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch current USD prices for the given symbols in one batched call.
    /// Symbols the provider does not know are simply absent from the map.
    async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, MarketDataError>;
}

/// HTTP client for the market-data provider.
#[derive(Debug, Clone)]
pub struct MarketDataClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PricesResponse {
    prices: HashMap<String, f64>,
}

impl MarketDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MarketDataSource for MarketDataClient {
    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, MarketDataError> {
        let url = format!("{}/v1/prices", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbols", symbols.join(","))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::Status(status.as_u16()));
        }

        let data: PricesResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::Decode(e.to_string()))?;

        debug!(
            requested = symbols.len(),
            returned = data.prices.len(),
            "fetched market prices"
        );

        Ok(data.prices)
    }
}
