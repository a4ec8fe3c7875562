//! Coinwatch price tracker daemon
//!
//! Seeds tracked symbols from the environment, then logs engine
//! statistics until interrupted.

use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use log::{error, info, warn};

use coinwatch_rust_core::{CoinGeckoClient, PriceStore, RamStore};
use price_tracker_rust::config::TrackerConfig;
use price_tracker_rust::tracker::PriceTracker;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    info!("Starting price_tracker_rust...");

    let config = TrackerConfig::from_env()?;
    info!(
        "Poll interval: {}s (set_interval bounds {}..={}s), seed symbols: {:?}",
        config.poll_interval_secs,
        config.min_interval_secs,
        config.max_interval_secs,
        config.seed_symbols
    );

    let source = Arc::new(CoinGeckoClient::with_timeout(
        config.api_key.clone(),
        config.fetch_timeout(),
    ));
    let store = Arc::new(RamStore::new());

    let tracker = PriceTracker::new(config.clone(), source, store.clone());
    tracker.start();

    for symbol in &config.seed_symbols {
        match tracker.add_tracking(symbol).await {
            Ok(coin) => info!("Tracking {} ({})", coin.symbol, coin.id),
            Err(err) => warn!("Could not track {}: {}", symbol, err),
        }
    }

    let mut stats_timer = tokio::time::interval(config.stats_log_interval());
    stats_timer.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = stats_timer.tick() => {
                let stats = tracker.stats();
                let latest = store.latest().await;
                info!(
                    "Stats: symbols={} polls_ok={} polls_failed={} refreshes={} workers_started={} workers_stopped={}",
                    latest.len(),
                    stats.polls_completed,
                    stats.poll_failures,
                    stats.manual_refreshes,
                    stats.workers_started,
                    stats.workers_stopped,
                );
                if let Some(at) = tracker.last_updated().await {
                    info!("Last price update at {}", at.to_rfc3339());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                if let Err(err) = tracker.stop_polling().await {
                    error!("Failed to stop polling cleanly: {}", err);
                }
                break;
            }
        }
    }

    info!("price_tracker_rust stopped");
    Ok(())
}
