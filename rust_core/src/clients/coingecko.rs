//! CoinGecko API Client
//!
//! Provides asset search and live USD spot prices for the tracker
//! services. Implements [`PriceSource`] so engines can swap providers.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::price_source::{CoinInfo, PriceSource};

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_TIMEOUT_SECS: u64 = 5;
const VS_CURRENCY: &str = "usd";

/// CoinGecko API client
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    /// Demo API key, sent as the `x_cg_demo_api_key` query parameter
    api_key: Option<String>,
}

/// Response from the /search endpoint
#[derive(Debug, Deserialize)]
struct SearchResponse {
    coins: Vec<CoinInfo>,
}

impl CoinGeckoClient {
    /// Create a new CoinGecko client with the default request timeout.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_timeout(api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create with a custom per-request timeout.
    pub fn with_timeout(api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Coinwatch/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    async fn fetch_search(&self, query: &str) -> Result<SearchResponse> {
        let url = format!("{}/search?query={}", self.base_url, query);

        debug!("Searching CoinGecko for {}", query);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch from CoinGecko")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("CoinGecko API error: {} - {}", status, body));
        }

        response
            .json()
            .await
            .context("Failed to parse CoinGecko search response")
    }

    async fn fetch_price(&self, id: &str) -> Result<f64> {
        let mut url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url, id, VS_CURRENCY
        );
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&x_cg_demo_api_key={}", key));
        }

        debug!("Fetching price for {} from CoinGecko", id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch from CoinGecko")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("CoinGecko API error: {} - {}", status, body));
        }

        let prices: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .context("Failed to parse CoinGecko price response")?;

        prices
            .get(id)
            .and_then(|quotes| quotes.get(VS_CURRENCY))
            .copied()
            .ok_or_else(|| anyhow!("No {} price for {} in response", VS_CURRENCY, id))
    }
}

impl Default for CoinGeckoClient {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    fn source_name(&self) -> &str {
        "coingecko"
    }

    async fn search(&self, query: &str) -> Result<Vec<CoinInfo>> {
        Ok(self.fetch_search(query).await?.coins)
    }

    async fn price(&self, id: &str) -> Result<f64> {
        self.fetch_price(id).await
    }
}
