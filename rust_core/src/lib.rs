//! Coinwatch Core - shared building blocks for live crypto price tracking.
//!
//! This crate provides:
//! - Price source clients (CoinGecko) behind the `PriceSource` trait
//! - In-memory price storage with bounded per-symbol history
//! - Windowed price statistics (min/max/avg/change over retained history)

pub mod clients;
pub mod storage;

pub use clients::{CoinGeckoClient, CoinInfo, PriceSource};
pub use storage::{PriceRecord, PriceStats, PriceStore, RamStore, RingBuffer, StoreError};
