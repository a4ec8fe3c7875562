//! Tracker engine types

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors surfaced by tracker operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The symbol already has a live worker.
    #[error("symbol {0} is already tracked")]
    DuplicateSymbol(String),

    /// Lookup found no exact match, or the operation addressed a symbol
    /// that is not in the registry.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// The search backend could not be reached or answered garbage.
    #[error("lookup failed for {symbol}: {message}")]
    LookupUnavailable { symbol: String, message: String },

    /// A price fetch failed during admission.
    #[error("price fetch failed for {symbol}: {message}")]
    FetchFailed { symbol: String, message: String },

    /// Requested polling interval falls outside the configured bounds.
    #[error("interval {seconds}s is outside the accepted range {min}..={max}s")]
    IntervalOutOfRange { seconds: u64, min: u64, max: u64 },

    /// The engine is not in a state to serve the request.
    #[error("tracker state error: {0}")]
    StateError(String),
}

/// Ack sender carried by every worker control message.
pub(crate) type Ack = oneshot::Sender<()>;
/// Receiver half the caller blocks on until the command is applied.
pub(crate) type AckWait = oneshot::Receiver<()>;

/// Failure report sent by workers to the error sink.
pub(crate) struct PollFailure {
    pub symbol: String,
    pub error: anyhow::Error,
}

/// Statistics tracking
pub struct TrackerStats {
    pub polls_completed: AtomicU64,
    pub poll_failures: AtomicU64,
    pub manual_refreshes: AtomicU64,
    pub workers_started: AtomicU64,
    pub workers_stopped: AtomicU64,
}

impl TrackerStats {
    pub fn new() -> Self {
        Self {
            polls_completed: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            manual_refreshes: AtomicU64::new(0),
            workers_started: AtomicU64::new(0),
            workers_stopped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> TrackerStatsSnapshot {
        TrackerStatsSnapshot {
            polls_completed: self.polls_completed.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            manual_refreshes: self.manual_refreshes.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_stopped: self.workers_stopped.load(Ordering::Relaxed),
        }
    }
}

impl Default for TrackerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct TrackerStatsSnapshot {
    pub polls_completed: u64,
    pub poll_failures: u64,
    pub manual_refreshes: u64,
    pub workers_started: u64,
    pub workers_stopped: u64,
}
