//! End-to-end engine tests against a scripted price source.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::sleep;
use tokio_test::assert_ok;

use coinwatch_rust_core::{CoinInfo, PriceSource, PriceStore, RamStore, StoreError};
use price_tracker_rust::{PriceTracker, TrackerConfig, TrackerError};

/// Price source serving a fixed listing table and a monotonically
/// increasing price, with switchable failure modes.
struct ScriptedSource {
    listings: Vec<CoinInfo>,
    next_price: AtomicU64,
    fail_search: AtomicBool,
    fail_price: AtomicBool,
    price_calls: AtomicU64,
}

fn coin(id: &str, symbol: &str, name: &str) -> CoinInfo {
    CoinInfo {
        id: id.to_string(),
        symbol: symbol.to_string(),
        name: name.to_string(),
    }
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            listings: vec![
                coin("bitcoin", "BTC", "Bitcoin"),
                coin("ethereum", "ETH", "Ethereum"),
                coin("solana", "SOL", "Solana"),
                coin("wrapped-bitcoin", "WBTC", "Wrapped Bitcoin"),
            ],
            next_price: AtomicU64::new(0),
            fail_search: AtomicBool::new(false),
            fail_price: AtomicBool::new(false),
            price_calls: AtomicU64::new(0),
        }
    }

    fn price_calls(&self) -> u64 {
        self.price_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    fn source_name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &str) -> Result<Vec<CoinInfo>> {
        if self.fail_search.load(Ordering::Relaxed) {
            bail!("search endpoint down");
        }
        let query = query.to_lowercase();
        Ok(self
            .listings
            .iter()
            .filter(|c| c.symbol.to_lowercase().contains(&query) || c.id.contains(&query))
            .cloned()
            .collect())
    }

    async fn price(&self, id: &str) -> Result<f64> {
        if self.fail_price.load(Ordering::Relaxed) {
            bail!("price endpoint down");
        }
        if !self.listings.iter().any(|c| c.id == id) {
            bail!("unknown id {}", id);
        }
        self.price_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.next_price.fetch_add(1, Ordering::Relaxed) as f64 + 1.0)
    }
}

/// Workers start idle so tests drive every poll explicitly; the schedule
/// tests re-enable the timer through set_interval.
fn test_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval_secs: 0,
        min_interval_secs: 1,
        max_interval_secs: 3600,
        ..TrackerConfig::default()
    }
}

fn engine(source: Arc<ScriptedSource>) -> (PriceTracker, Arc<RamStore>) {
    let store = Arc::new(RamStore::new());
    let tracker = PriceTracker::new(test_config(), source, store.clone());
    tracker.start();
    (tracker, store)
}

async fn history_len(store: &RamStore, symbol: &str) -> usize {
    store.history(symbol).await.map(|h| h.len()).unwrap_or(0)
}

#[tokio::test]
async fn test_add_primes_first_price() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source.clone());

    let coin = tracker.add_tracking("BTC").await.unwrap();
    assert_eq!(coin.id, "bitcoin");
    assert_eq!(coin.name, "Bitcoin");

    // The first price is already committed when add returns.
    let latest = store.latest().await;
    assert_eq!(latest["BTC"].price, 1.0);
    assert_eq!(latest["BTC"].name, "Bitcoin");
    assert!(tracker.last_updated().await.is_some());
}

#[tokio::test]
async fn test_duplicate_add_rejected() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, _store) = engine(source);

    tracker.add_tracking("BTC").await.unwrap();
    let err = tracker.add_tracking("BTC").await.unwrap_err();
    assert!(matches!(err, TrackerError::DuplicateSymbol(_)));

    // Still exactly one live worker.
    assert_eq!(tracker.refresh_all().await.unwrap(), 1);
}

#[tokio::test]
async fn test_add_requires_exact_symbol_match() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source);

    let err = tracker.add_tracking("NOPE").await.unwrap_err();
    assert!(matches!(err, TrackerError::UnknownSymbol(_)));

    // The lookup query is case-normalized but the candidate match is
    // exact, so lowercase input does not match the listed "BTC".
    let err = tracker.add_tracking("btc").await.unwrap_err();
    assert!(matches!(err, TrackerError::UnknownSymbol(_)));

    assert!(store.latest().await.is_empty());
}

#[tokio::test]
async fn test_add_when_lookup_is_down() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, _store) = engine(source.clone());

    source.fail_search.store(true, Ordering::Relaxed);
    let err = tracker.add_tracking("BTC").await.unwrap_err();
    assert!(matches!(err, TrackerError::LookupUnavailable { .. }));

    source.fail_search.store(false, Ordering::Relaxed);
    assert!(tracker.add_tracking("BTC").await.is_ok());
}

#[tokio::test]
async fn test_failed_first_fetch_leaves_symbol_untracked() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source.clone());

    source.fail_price.store(true, Ordering::Relaxed);
    let err = tracker.add_tracking("BTC").await.unwrap_err();
    assert!(matches!(err, TrackerError::FetchFailed { .. }));

    // Nothing was registered or stored.
    assert!(store.latest().await.is_empty());
    assert!(matches!(
        tracker.refresh_price("BTC").await.unwrap_err(),
        TrackerError::UnknownSymbol(_)
    ));

    // The same symbol can be admitted once the source recovers.
    source.fail_price.store(false, Ordering::Relaxed);
    assert!(tracker.add_tracking("BTC").await.is_ok());
}

#[tokio::test]
async fn test_refresh_one_and_all() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source);

    tracker.add_tracking("BTC").await.unwrap();
    tracker.add_tracking("ETH").await.unwrap();

    tracker.refresh_price("BTC").await.unwrap();
    assert_eq!(history_len(&store, "BTC").await, 2);
    assert_eq!(history_len(&store, "ETH").await, 1);

    // One observation per tracked symbol, already committed on return.
    let refreshed = tracker.refresh_all().await.unwrap();
    assert_eq!(refreshed, 2);
    assert_eq!(history_len(&store, "BTC").await, 3);
    assert_eq!(history_len(&store, "ETH").await, 2);

    assert!(matches!(
        tracker.refresh_price("SOL").await.unwrap_err(),
        TrackerError::UnknownSymbol(_)
    ));
}

#[tokio::test]
async fn test_remove_tracking() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source);

    tracker.add_tracking("BTC").await.unwrap();
    tracker.add_tracking("ETH").await.unwrap();

    tracker.remove_tracking("BTC").await.unwrap();

    // Gone from latest queries and from the registry.
    let latest = store.latest().await;
    assert!(!latest.contains_key("BTC"));
    assert!(latest.contains_key("ETH"));
    assert!(matches!(
        store.history("BTC").await.unwrap_err(),
        StoreError::SymbolNotTracked(_)
    ));
    assert!(matches!(
        tracker.refresh_price("BTC").await.unwrap_err(),
        TrackerError::UnknownSymbol(_)
    ));
    assert!(matches!(
        tracker.remove_tracking("BTC").await.unwrap_err(),
        TrackerError::UnknownSymbol(_)
    ));

    assert_eq!(tracker.refresh_all().await.unwrap(), 1);
}

#[tokio::test]
async fn test_interval_bounds_rejected_before_broadcast() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, _store) = engine(source.clone());

    tracker.add_tracking("BTC").await.unwrap();
    let calls_before = source.price_calls();

    let err = tracker.set_interval(Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, TrackerError::IntervalOutOfRange { .. }));

    let err = tracker.set_interval(Duration::from_secs(4000)).await.unwrap_err();
    assert!(matches!(
        err,
        TrackerError::IntervalOutOfRange { max: 3600, .. }
    ));

    // No worker was touched and the cadence is unchanged.
    assert_eq!(source.price_calls(), calls_before);
    assert_eq!(tracker.get_interval().await.unwrap(), None);
}

#[tokio::test]
async fn test_schedule_lifecycle() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source);

    tracker.add_tracking("BTC").await.unwrap();
    assert_eq!(history_len(&store, "BTC").await, 1);

    // Enable a 1s cadence and let it tick a few times.
    tracker.set_interval(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        tracker.get_interval().await.unwrap(),
        Some(Duration::from_secs(1))
    );
    sleep(Duration::from_millis(2500)).await;
    let polled = history_len(&store, "BTC").await;
    assert!(polled >= 3, "expected automatic polls, saw {}", polled);

    // Stop polling: the interval reads as disabled and commits freeze.
    tracker.stop_polling().await.unwrap();
    assert_eq!(tracker.get_interval().await.unwrap(), None);
    let frozen = history_len(&store, "BTC").await;
    sleep(Duration::from_millis(1300)).await;
    assert_eq!(history_len(&store, "BTC").await, frozen);

    // Manual refresh still works while the schedule is off.
    tracker.refresh_price("BTC").await.unwrap();
    assert_eq!(history_len(&store, "BTC").await, frozen + 1);

    // Re-enabling resumes automatic polling.
    tracker.set_interval(Duration::from_secs(1)).await.unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert!(history_len(&store, "BTC").await > frozen + 1);
}

#[tokio::test]
async fn test_history_window_is_bounded() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source);

    tracker.add_tracking("BTC").await.unwrap();
    for _ in 0..105 {
        tracker.refresh_price("BTC").await.unwrap();
    }

    // 106 commits total, the oldest six evicted.
    let history = store.history("BTC").await.unwrap();
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].price, 7.0);
    assert_eq!(history[99].price, 106.0);

    let stats = store.stats("BTC").await.unwrap();
    assert_eq!(stats.records_count, 100);
    assert_eq!(stats.min_price, 7.0);
    assert_eq!(stats.max_price, 106.0);
}

#[tokio::test]
async fn test_poll_failure_does_not_kill_worker() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source.clone());

    tracker.add_tracking("BTC").await.unwrap();

    source.fail_price.store(true, Ordering::Relaxed);
    // The refresh is acknowledged even though the poll failed.
    tracker.refresh_price("BTC").await.unwrap();
    assert_eq!(history_len(&store, "BTC").await, 1);

    source.fail_price.store(false, Ordering::Relaxed);
    tracker.refresh_price("BTC").await.unwrap();
    assert_eq!(history_len(&store, "BTC").await, 2);

    let stats = tracker.stats();
    assert!(stats.poll_failures >= 1);
    assert!(stats.polls_completed >= 2);
}

#[tokio::test]
async fn test_operations_require_start() {
    let source = Arc::new(ScriptedSource::new());
    let store = Arc::new(RamStore::new());
    let tracker = PriceTracker::new(test_config(), source, store);

    assert!(matches!(
        tracker.add_tracking("BTC").await.unwrap_err(),
        TrackerError::StateError(_)
    ));
    assert!(matches!(
        tracker.get_interval().await.unwrap_err(),
        TrackerError::StateError(_)
    ));

    tracker.start();
    tracker.start(); // idempotent
    assert_ok!(tracker.add_tracking("BTC").await);
}

#[tokio::test]
async fn test_concurrent_operations() {
    let source = Arc::new(ScriptedSource::new());
    let (tracker, store) = engine(source);

    tracker.add_tracking("BTC").await.unwrap();
    tracker.add_tracking("ETH").await.unwrap();
    tracker.add_tracking("SOL").await.unwrap();

    let (refreshed, refresh_one, added, interval) = tokio::join!(
        tracker.refresh_all(),
        tracker.refresh_price("BTC"),
        tracker.add_tracking("WBTC"),
        tracker.get_interval(),
    );

    // The coordinator serializes these; the broadcast count reflects the
    // registry at whichever turn it landed in.
    let refreshed = refreshed.unwrap();
    assert!(refreshed == 3 || refreshed == 4);
    refresh_one.unwrap();
    assert_eq!(added.unwrap().id, "wrapped-bitcoin");
    interval.unwrap();

    for symbol in ["BTC", "ETH", "SOL", "WBTC"] {
        tracker.remove_tracking(symbol).await.unwrap();
    }
    assert!(store.latest().await.is_empty());
    assert_eq!(tracker.refresh_all().await.unwrap(), 0);
}
