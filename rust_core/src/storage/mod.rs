//! Price storage
//!
//! Contracts and types for recording live price observations with a
//! bounded per-symbol history window.

pub mod ram_store;
pub mod ring_buffer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use ram_store::RamStore;
pub use ring_buffer::RingBuffer;

/// Errors returned by price stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The symbol has no history in the store.
    #[error("symbol {0} is not being tracked")]
    SymbolNotTracked(String),

    /// The symbol exists but has no retained records.
    #[error("no records for {0}")]
    NoRecords(String),
}

/// A single observed price point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub time: DateTime<Utc>,
}

impl PriceRecord {
    pub fn new(symbol: &str, name: &str, price: f64, time: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price,
            time,
        }
    }
}

/// Aggregate statistics over a symbol's retained history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    /// Latest price minus the window minimum.
    pub price_change: f64,
    /// `price_change` relative to the window minimum, as a percentage.
    /// Zero when the minimum is zero.
    pub price_change_percent: f64,
    pub records_count: usize,
}

/// Store of per-symbol price histories.
///
/// Implementations retain a bounded number of records per symbol and
/// evict oldest-first once the bound is reached.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Append an observation to the symbol's history, creating the
    /// history on first use.
    async fn record(
        &self,
        symbol: &str,
        name: &str,
        price: f64,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Most recent record for every stored symbol.
    async fn latest(&self) -> HashMap<String, PriceRecord>;

    /// Full retained history for a symbol, oldest first.
    async fn history(&self, symbol: &str) -> Result<Vec<PriceRecord>, StoreError>;

    /// Statistics over the symbol's retained window.
    async fn stats(&self, symbol: &str) -> Result<PriceStats, StoreError>;

    /// Drop a symbol and its entire history.
    async fn remove(&self, symbol: &str) -> Result<(), StoreError>;
}
