//! In-memory price store
//!
//! Keeps a bounded ring buffer of observations per symbol. All state
//! lives behind a single RwLock so reads (latest, history, stats) can
//! run concurrently while commits and removals take the write side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ring_buffer::RingBuffer;
use super::{PriceRecord, PriceStats, PriceStore, StoreError};

/// Records retained per symbol before oldest-first eviction.
pub const DEFAULT_HISTORY: usize = 100;

/// RAM-backed [`PriceStore`] implementation.
pub struct RamStore {
    data: RwLock<HashMap<String, RingBuffer>>,
    capacity: usize,
}

impl RamStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY)
    }

    /// Create a store with a custom per-symbol history bound.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            capacity,
        }
    }
}

impl Default for RamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceStore for RamStore {
    async fn record(
        &self,
        symbol: &str,
        name: &str,
        price: f64,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        data.entry(symbol.to_string())
            .or_insert_with(|| RingBuffer::new(self.capacity))
            .push(PriceRecord::new(symbol, name, price, time));
        Ok(())
    }

    async fn latest(&self) -> HashMap<String, PriceRecord> {
        let data = self.data.read().await;
        let mut res = HashMap::with_capacity(data.len());
        for (symbol, history) in data.iter() {
            if let Some(record) = history.last() {
                res.insert(symbol.clone(), record.clone());
            }
        }
        res
    }

    async fn history(&self, symbol: &str) -> Result<Vec<PriceRecord>, StoreError> {
        let data = self.data.read().await;
        let history = data
            .get(symbol)
            .ok_or_else(|| StoreError::SymbolNotTracked(symbol.to_string()))?;
        Ok(history.values())
    }

    async fn stats(&self, symbol: &str) -> Result<PriceStats, StoreError> {
        let data = self.data.read().await;
        let history = data
            .get(symbol)
            .ok_or_else(|| StoreError::SymbolNotTracked(symbol.to_string()))?;
        let last = history
            .last()
            .ok_or_else(|| StoreError::NoRecords(symbol.to_string()))?;

        let mut min_price = f64::INFINITY;
        let mut max_price = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for record in history.iter() {
            min_price = min_price.min(record.price);
            max_price = max_price.max(record.price);
            sum += record.price;
        }

        let price_change = last.price - min_price;
        let price_change_percent = if min_price != 0.0 {
            (price_change / min_price) * 100.0
        } else {
            0.0
        };

        Ok(PriceStats {
            min_price,
            max_price,
            avg_price: sum / history.len() as f64,
            price_change,
            price_change_percent,
            records_count: history.len(),
        })
    }

    async fn remove(&self, symbol: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        data.remove(symbol)
            .map(|_| ())
            .ok_or_else(|| StoreError::SymbolNotTracked(symbol.to_string()))
    }
}
