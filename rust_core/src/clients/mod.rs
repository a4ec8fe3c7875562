pub mod coingecko;
pub mod price_source;

// Re-export commonly used types
pub use coingecko::CoinGeckoClient;
pub use price_source::{CoinInfo, PriceSource};
