//! Coinwatch live price tracker engine.
//!
//! A single coordinator task owns the registry of tracked symbols; each
//! symbol gets a dedicated polling worker that the coordinator reaches
//! only through acked control channels. `PriceTracker` is the public
//! facade over both.

pub mod config;
pub mod tracker;
pub mod types;

mod worker;

pub use config::TrackerConfig;
pub use tracker::PriceTracker;
pub use types::{TrackerError, TrackerStats, TrackerStatsSnapshot};
