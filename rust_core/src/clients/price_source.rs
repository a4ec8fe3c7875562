//! Price source abstraction
//!
//! Trait for market-data providers so tracker engines can swap the real
//! CoinGecko client for test doubles or alternative providers.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An asset listing returned by a price source search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinInfo {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

/// Asynchronous provider of asset lookups and live prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Provider name for logging and diagnostics.
    fn source_name(&self) -> &str;

    /// Search for assets matching a free-text query.
    async fn search(&self, query: &str) -> Result<Vec<CoinInfo>>;

    /// Current USD price for an asset id previously returned by `search`.
    async fn price(&self, id: &str) -> Result<f64>;
}
