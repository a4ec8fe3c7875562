//! Per-symbol polling worker
//!
//! Each tracked symbol runs one worker task that owns that symbol's poll
//! timer. The coordinator reaches it only through three control channels
//! (interval change, manual refresh, delete); every control message
//! carries an ack sender so callers can block until the command has been
//! applied. The worker closes its own receivers on the way out.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{self, Instant, Interval};

use coinwatch_rust_core::{CoinInfo, PriceSource, PriceStore};

use crate::types::{Ack, PollFailure, TrackerError, TrackerStats};

pub(crate) struct Worker {
    pub coin: CoinInfo,
    pub source: Arc<dyn PriceSource>,
    pub store: Arc<dyn PriceStore>,
    pub last_updated: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub error_tx: mpsc::UnboundedSender<PollFailure>,
    pub stats: Arc<TrackerStats>,
    pub interval_rx: mpsc::UnboundedReceiver<(Option<Duration>, Ack)>,
    pub refresh_rx: mpsc::UnboundedReceiver<Ack>,
    pub delete_rx: mpsc::UnboundedReceiver<Ack>,
}

impl Worker {
    /// Poll once to prime the store, then serve the control loop until a
    /// delete arrives. The priming result is reported through `started`;
    /// when that first poll fails the worker exits without ever having
    /// been observable.
    pub(crate) async fn run(
        mut self,
        initial_interval: Option<Duration>,
        started: oneshot::Sender<Result<(), TrackerError>>,
    ) {
        if let Err(err) = self.poll_once().await {
            self.stats.poll_failures.fetch_add(1, Ordering::Relaxed);
            let _ = started.send(Err(TrackerError::FetchFailed {
                symbol: self.coin.symbol.clone(),
                message: format!("{err:#}"),
            }));
            return;
        }
        if started.send(Ok(())).is_err() {
            // Admission gave up on us before we were registered.
            return;
        }

        self.stats.workers_started.fetch_add(1, Ordering::Relaxed);
        debug!("worker {}: started", self.coin.symbol);

        let mut timer = make_timer(initial_interval);
        loop {
            tokio::select! {
                _ = tick(&mut timer), if timer.is_some() => {
                    if let Err(err) = self.poll_once().await {
                        self.report(err);
                    }
                }
                Some((interval, ack)) = self.interval_rx.recv() => {
                    debug!("worker {}: interval set to {:?}", self.coin.symbol, interval);
                    timer = make_timer(interval);
                    let _ = ack.send(());
                }
                Some(ack) = self.refresh_rx.recv() => {
                    self.stats.manual_refreshes.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = self.poll_once().await {
                        self.report(err);
                    }
                    let _ = ack.send(());
                }
                // A closed delete channel means the coordinator itself is
                // gone and counts as a delete.
                maybe_ack = self.delete_rx.recv() => {
                    self.teardown();
                    if let Some(ack) = maybe_ack {
                        let _ = ack.send(());
                    }
                    return;
                }
            }
        }
    }

    /// Fetch the current price and commit it, stamping the shared
    /// last-updated marker on success.
    async fn poll_once(&self) -> anyhow::Result<()> {
        let price = self
            .source
            .price(&self.coin.id)
            .await
            .with_context(|| format!("fetching {}", self.coin.id))?;
        self.store
            .record(&self.coin.symbol, &self.coin.name, price, Utc::now())
            .await
            .with_context(|| format!("recording {}", self.coin.symbol))?;
        *self.last_updated.write().await = Some(Utc::now());
        self.stats.polls_completed.fetch_add(1, Ordering::Relaxed);
        debug!("worker {}: committed price {}", self.coin.symbol, price);
        Ok(())
    }

    fn report(&self, error: anyhow::Error) {
        self.stats.poll_failures.fetch_add(1, Ordering::Relaxed);
        let _ = self.error_tx.send(PollFailure {
            symbol: self.coin.symbol.clone(),
            error,
        });
    }

    fn teardown(&mut self) {
        self.interval_rx.close();
        self.refresh_rx.close();
        self.delete_rx.close();
        // Control commands that were queued before the delete are acked as
        // no-ops so their callers unblock; the registry entry is already
        // gone, so nothing new can arrive.
        while let Ok((_, ack)) = self.interval_rx.try_recv() {
            let _ = ack.send(());
        }
        while let Ok(ack) = self.refresh_rx.try_recv() {
            let _ = ack.send(());
        }
        self.stats.workers_stopped.fetch_add(1, Ordering::Relaxed);
        debug!("worker {}: stopped", self.coin.symbol);
    }
}

/// Build the poll timer. `None` leaves the worker idle until the next
/// interval change. The first tick fires one full period from now.
fn make_timer(interval: Option<Duration>) -> Option<Interval> {
    interval.map(|period| time::interval_at(Instant::now() + period, period))
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        // Unreachable behind the `timer.is_some()` select guard.
        None => std::future::pending().await,
    }
}
