//! Tracker engine
//!
//! `PriceTracker` is the public face. All registry state lives inside one
//! coordinator task that owns the symbol -> worker map outright; callers
//! reach it over a command channel and block on per-command acks, so
//! admissions, removals, and broadcasts apply in strict serial order and
//! no lock is ever shared across tasks.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use log::{info, warn};
use tokio::sync::{mpsc, oneshot, RwLock};

use coinwatch_rust_core::{CoinInfo, PriceSource, PriceStore};

use crate::config::TrackerConfig;
use crate::types::{Ack, AckWait, PollFailure, TrackerError, TrackerStats, TrackerStatsSnapshot};
use crate::worker::Worker;

enum TrackerCommand {
    Add {
        symbol: String,
        reply: oneshot::Sender<Result<CoinInfo, TrackerError>>,
    },
    Remove {
        symbol: String,
        reply: oneshot::Sender<Result<AckWait, TrackerError>>,
    },
    Refresh {
        symbol: String,
        reply: oneshot::Sender<Result<AckWait, TrackerError>>,
    },
    RefreshAll {
        reply: oneshot::Sender<Vec<AckWait>>,
    },
    SetInterval {
        interval: Option<Duration>,
        reply: oneshot::Sender<Vec<AckWait>>,
    },
    GetInterval {
        reply: oneshot::Sender<Option<Duration>>,
    },
}

/// Registry entry: the tracked asset plus the sending half of its
/// worker's control channels.
struct WorkerHandle {
    coin: CoinInfo,
    interval_tx: mpsc::UnboundedSender<(Option<Duration>, Ack)>,
    refresh_tx: mpsc::UnboundedSender<Ack>,
    delete_tx: mpsc::UnboundedSender<Ack>,
}

/// Owns the registry. Commands are processed one at a time, which is what
/// makes admission, removal, and broadcast atomic with respect to each
/// other.
struct Coordinator {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    stats: Arc<TrackerStats>,
    last_updated: Arc<RwLock<Option<DateTime<Utc>>>>,
    error_tx: mpsc::UnboundedSender<PollFailure>,
    registry: HashMap<String, WorkerHandle>,
    /// Current global cadence, handed to new workers and re-broadcast on
    /// interval changes. `None` while automatic polling is disabled.
    interval: Option<Duration>,
}

impl Coordinator {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<TrackerCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                TrackerCommand::Add { symbol, reply } => {
                    let _ = reply.send(self.admit(&symbol).await);
                }
                TrackerCommand::Remove { symbol, reply } => {
                    let _ = reply.send(self.remove(&symbol));
                }
                TrackerCommand::Refresh { symbol, reply } => {
                    let _ = reply.send(self.refresh(&symbol));
                }
                TrackerCommand::RefreshAll { reply } => {
                    let _ = reply.send(self.refresh_all());
                }
                TrackerCommand::SetInterval { interval, reply } => {
                    let _ = reply.send(self.set_interval(interval));
                }
                TrackerCommand::GetInterval { reply } => {
                    let _ = reply.send(self.interval);
                }
            }
        }
        // Facade dropped. Dropping the registry closes every worker's
        // control channels, which workers treat as a delete.
    }

    /// Admission runs entirely inside this turn: lookup, exact symbol
    /// match, spawn, and the worker's priming poll. No other command can
    /// observe a half-admitted symbol, and a failed first fetch leaves
    /// the registry untouched.
    async fn admit(&mut self, symbol: &str) -> Result<CoinInfo, TrackerError> {
        if self.registry.contains_key(symbol) {
            return Err(TrackerError::DuplicateSymbol(symbol.to_string()));
        }

        let candidates = self
            .source
            .search(&symbol.to_lowercase())
            .await
            .map_err(|err| TrackerError::LookupUnavailable {
                symbol: symbol.to_string(),
                message: format!("{err:#}"),
            })?;

        let coin = candidates
            .into_iter()
            .find(|candidate| candidate.symbol == symbol)
            .ok_or_else(|| TrackerError::UnknownSymbol(symbol.to_string()))?;

        let (interval_tx, interval_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (delete_tx, delete_rx) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = oneshot::channel();

        let worker = Worker {
            coin: coin.clone(),
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
            last_updated: Arc::clone(&self.last_updated),
            error_tx: self.error_tx.clone(),
            stats: Arc::clone(&self.stats),
            interval_rx,
            refresh_rx,
            delete_rx,
        };
        tokio::spawn(worker.run(self.interval, started_tx));

        match started_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(TrackerError::StateError(format!(
                    "worker for {} exited during startup",
                    symbol
                )));
            }
        }

        info!("tracking {} ({})", coin.symbol, coin.id);
        self.registry.insert(
            coin.symbol.clone(),
            WorkerHandle {
                coin: coin.clone(),
                interval_tx,
                refresh_tx,
                delete_tx,
            },
        );
        Ok(coin)
    }

    /// Drop the registry entry and queue the delete in the same turn, so
    /// no later command can route anything to the dying worker.
    fn remove(&mut self, symbol: &str) -> Result<AckWait, TrackerError> {
        let handle = self
            .registry
            .remove(symbol)
            .ok_or_else(|| TrackerError::UnknownSymbol(symbol.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        handle
            .delete_tx
            .send(ack_tx)
            .map_err(|_| TrackerError::StateError(format!("worker for {} is gone", symbol)))?;
        info!("stopped tracking {} ({})", symbol, handle.coin.id);
        Ok(ack_rx)
    }

    fn refresh(&self, symbol: &str) -> Result<AckWait, TrackerError> {
        let handle = self
            .registry
            .get(symbol)
            .ok_or_else(|| TrackerError::UnknownSymbol(symbol.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        handle
            .refresh_tx
            .send(ack_tx)
            .map_err(|_| TrackerError::StateError(format!("worker for {} is gone", symbol)))?;
        Ok(ack_rx)
    }

    /// Queue one refresh per live worker in a single turn. Workers
    /// admitted after this turn never see the broadcast.
    fn refresh_all(&self) -> Vec<AckWait> {
        let mut acks = Vec::with_capacity(self.registry.len());
        for (symbol, handle) in self.registry.iter() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if handle.refresh_tx.send(ack_tx).is_ok() {
                acks.push(ack_rx);
            } else {
                warn!("refresh all: worker for {} is gone", symbol);
            }
        }
        acks
    }

    /// Record the new cadence and queue it to every live worker in a
    /// single turn.
    fn set_interval(&mut self, interval: Option<Duration>) -> Vec<AckWait> {
        self.interval = interval;
        let mut acks = Vec::with_capacity(self.registry.len());
        for (symbol, handle) in self.registry.iter() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if handle.interval_tx.send((interval, ack_tx)).is_ok() {
                acks.push(ack_rx);
            } else {
                warn!("set interval: worker for {} is gone", symbol);
            }
        }
        acks
    }
}

/// Logs worker poll failures. Runs until every worker and the
/// coordinator have dropped their sender.
async fn drain_errors(mut errors: mpsc::UnboundedReceiver<PollFailure>) {
    while let Some(failure) = errors.recv().await {
        warn!("worker {}: poll failed: {:#}", failure.symbol, failure.error);
    }
}

async fn wait_ack(ack: AckWait, symbol: &str) -> Result<(), TrackerError> {
    ack.await.map_err(|_| {
        TrackerError::StateError(format!("worker for {} exited before acknowledging", symbol))
    })
}

/// Live price tracking engine.
///
/// Owns one coordinator task plus one polling worker per tracked symbol.
/// Every operation blocks until the affected workers have applied it, so
/// a returned `Ok` means the effect is already visible in the store.
pub struct PriceTracker {
    config: TrackerConfig,
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    stats: Arc<TrackerStats>,
    last_updated: Arc<RwLock<Option<DateTime<Utc>>>>,
    commands: OnceLock<mpsc::UnboundedSender<TrackerCommand>>,
}

impl PriceTracker {
    pub fn new(
        config: TrackerConfig,
        source: Arc<dyn PriceSource>,
        store: Arc<dyn PriceStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            stats: Arc::new(TrackerStats::new()),
            last_updated: Arc::new(RwLock::new(None)),
            commands: OnceLock::new(),
        }
    }

    /// Start the coordinator and error-sink tasks. Idempotent; every
    /// other operation fails with `StateError` until this has run.
    pub fn start(&self) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        if self.commands.set(cmd_tx).is_err() {
            return;
        }
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator {
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
            stats: Arc::clone(&self.stats),
            last_updated: Arc::clone(&self.last_updated),
            error_tx,
            registry: HashMap::new(),
            interval: self.config.poll_interval(),
        };
        tokio::spawn(coordinator.run(cmd_rx));
        tokio::spawn(drain_errors(error_rx));
        info!(
            "price tracker started via {} (interval {:?})",
            self.source.source_name(),
            self.config.poll_interval()
        );
    }

    /// Begin tracking a symbol. Blocks until the symbol's first price has
    /// been committed; on any failure the symbol is left untracked.
    pub async fn add_tracking(&self, symbol: &str) -> Result<CoinInfo, TrackerError> {
        let symbol = symbol.trim().to_string();
        self.send_command(|reply| TrackerCommand::Add { symbol, reply })
            .await?
    }

    /// Stop tracking a symbol and drop its stored history. Blocks until
    /// the worker has shut down.
    pub async fn remove_tracking(&self, symbol: &str) -> Result<(), TrackerError> {
        let symbol = symbol.trim().to_string();
        let ack = self
            .send_command(|reply| TrackerCommand::Remove {
                symbol: symbol.clone(),
                reply,
            })
            .await??;
        wait_ack(ack, &symbol).await?;

        // The worker has acked, so nothing can commit under this symbol
        // anymore and the history can go.
        if let Err(err) = self.store.remove(&symbol).await {
            warn!(
                "removing {}: tracking stopped but history cleanup failed: {}",
                symbol, err
            );
        }
        Ok(())
    }

    /// Poll one symbol immediately, outside its schedule. Blocks until
    /// the attempt has completed.
    pub async fn refresh_price(&self, symbol: &str) -> Result<(), TrackerError> {
        let symbol = symbol.trim().to_string();
        let ack = self
            .send_command(|reply| TrackerCommand::Refresh {
                symbol: symbol.clone(),
                reply,
            })
            .await??;
        wait_ack(ack, &symbol).await
    }

    /// Poll every tracked symbol immediately. Returns how many workers
    /// were refreshed, counted when the broadcast was queued.
    pub async fn refresh_all(&self) -> Result<usize, TrackerError> {
        let acks = self
            .send_command(|reply| TrackerCommand::RefreshAll { reply })
            .await?;
        let refreshed = acks.len();
        for result in join_all(acks).await {
            result.map_err(|_| {
                TrackerError::StateError(
                    "a worker exited before acknowledging the refresh".to_string(),
                )
            })?;
        }
        Ok(refreshed)
    }

    /// Change every worker's polling cadence. Rejected without touching
    /// any worker when outside the configured bounds.
    pub async fn set_interval(&self, interval: Duration) -> Result<(), TrackerError> {
        let seconds = interval.as_secs();
        if seconds < self.config.min_interval_secs || seconds > self.config.max_interval_secs {
            return Err(TrackerError::IntervalOutOfRange {
                seconds,
                min: self.config.min_interval_secs,
                max: self.config.max_interval_secs,
            });
        }

        self.apply_interval(Some(interval)).await?;
        match self.get_interval().await? {
            Some(applied) if applied == interval => Ok(()),
            other => Err(TrackerError::StateError(format!(
                "interval should be {}s but is {:?}",
                seconds, other
            ))),
        }
    }

    /// Disable automatic polling for every worker. Tracking continues and
    /// manual refreshes still work.
    pub async fn stop_polling(&self) -> Result<(), TrackerError> {
        self.apply_interval(None).await?;
        match self.get_interval().await? {
            None => Ok(()),
            Some(applied) => Err(TrackerError::StateError(format!(
                "polling should be disabled but the interval is {:?}",
                applied
            ))),
        }
    }

    /// Current global polling cadence. `None` means automatic polling is
    /// off.
    pub async fn get_interval(&self) -> Result<Option<Duration>, TrackerError> {
        self.send_command(|reply| TrackerCommand::GetInterval { reply })
            .await
    }

    /// When any symbol last committed a price, if ever.
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.read().await
    }

    /// Counters snapshot for periodic logging.
    pub fn stats(&self) -> TrackerStatsSnapshot {
        self.stats.snapshot()
    }

    async fn apply_interval(&self, interval: Option<Duration>) -> Result<(), TrackerError> {
        let acks = self
            .send_command(|reply| TrackerCommand::SetInterval { interval, reply })
            .await?;
        for result in join_all(acks).await {
            result.map_err(|_| {
                TrackerError::StateError(
                    "a worker exited before applying the interval".to_string(),
                )
            })?;
        }
        Ok(())
    }

    async fn send_command<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> TrackerCommand,
    ) -> Result<R, TrackerError> {
        let commands = self
            .commands
            .get()
            .ok_or_else(|| TrackerError::StateError("tracker has not been started".to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(build(reply_tx))
            .map_err(|_| TrackerError::StateError("tracker coordinator is gone".to_string()))?;
        reply_rx.await.map_err(|_| {
            TrackerError::StateError("tracker coordinator dropped the request".to_string())
        })
    }
}
