//! Configuration for price_tracker_rust

use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// CoinGecko demo API key, if any.
    pub api_key: Option<String>,

    /// Polling cadence every worker starts on. Zero disables automatic
    /// polling until a SetInterval request arrives.
    pub poll_interval_secs: u64,

    /// Bounds enforced on SetInterval requests. The startup cadence above
    /// is not subject to them.
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,

    /// Per-request timeout for lookup and price fetches.
    pub fetch_timeout_secs: u64,

    /// Symbols to start tracking at boot.
    pub seed_symbols: Vec<String>,

    /// How often the daemon logs a stats snapshot.
    pub stats_log_interval_secs: u64,
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            api_key: env::var("COINGECKO_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),

            poll_interval_secs: parse_u64("TRACKER_POLL_INTERVAL_SECS", 3)?,
            min_interval_secs: parse_u64("TRACKER_MIN_INTERVAL_SECS", 10)?,
            max_interval_secs: parse_u64("TRACKER_MAX_INTERVAL_SECS", 3600)?,
            fetch_timeout_secs: parse_u64("TRACKER_FETCH_TIMEOUT_SECS", 5)?,

            seed_symbols: env::var("TRACKER_SYMBOLS")
                .unwrap_or_else(|_| "BTC,ETH".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            stats_log_interval_secs: parse_u64("TRACKER_STATS_LOG_INTERVAL_SECS", 60)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.min_interval_secs == 0 {
            return Err(anyhow!("TRACKER_MIN_INTERVAL_SECS must be > 0"));
        }
        if self.max_interval_secs < self.min_interval_secs {
            return Err(anyhow!(
                "TRACKER_MAX_INTERVAL_SECS must be >= TRACKER_MIN_INTERVAL_SECS"
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("TRACKER_FETCH_TIMEOUT_SECS must be > 0"));
        }
        if self.stats_log_interval_secs == 0 {
            return Err(anyhow!("TRACKER_STATS_LOG_INTERVAL_SECS must be > 0"));
        }
        Ok(())
    }

    /// Startup polling cadence. `None` when automatic polling is disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        if self.poll_interval_secs > 0 {
            Some(Duration::from_secs(self.poll_interval_secs))
        } else {
            None
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn stats_log_interval(&self) -> Duration {
        Duration::from_secs(self.stats_log_interval_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            poll_interval_secs: 3,
            min_interval_secs: 10,
            max_interval_secs: 3600,
            fetch_timeout_secs: 5,
            seed_symbols: vec!["BTC".to_string(), "ETH".to_string()],
            stats_log_interval_secs: 60,
        }
    }
}

/// Parse environment variable as u64 with default fallback
fn parse_u64(var_name: &str, default: u64) -> Result<u64> {
    match env::var(var_name) {
        Ok(val) => val
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        Err(_) => Ok(default),
    }
}
