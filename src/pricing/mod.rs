//! Pricing pipeline: market-data cache service, SOL/USD oracle, PnL math.
//!
//! The pieces are explicitly constructed and injectable so tests run against
//! isolated instances; `PricingBuilder` wires the production stack.

pub mod oracle;
pub mod pnl;
pub mod service;
pub mod sources;
pub mod store;
pub mod types;

// Re-export the primary surface
pub use oracle::SolPriceOracle;
pub use pnl::compute_token_metrics;
pub use service::{MarketDataService, ServiceStats};
pub use sources::{
    AggregatorSolSource, CoinGeckoSolSource, DexScreenerClient, JupiterSolSource, PairSource,
    SolPriceSource, WRAPPED_SOL_MINT,
};
pub use store::{MokaPriceStore, PriceStore};
pub use types::{MarketDataRecord, PricingConfig, TokenPair};

use nonempty::NonEmpty;
use reqwest::Client;
use std::sync::Arc;

/// Builder over `PricingConfig` with sensible defaults, wiring the full
/// production stack: aggregator client, oracle source chain, TTL store and
/// cache service.
pub struct PricingBuilder {
    config: PricingConfig,
}

impl PricingBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: PricingConfig::default(),
        }
    }

    /// Start from an externally assembled configuration.
    pub fn from_config(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Set the market aggregator base URL.
    pub fn with_market_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.market_api_base = base.into();
        self
    }

    /// Set the cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Set the minimum spacing between upstream calls.
    pub fn with_min_request_interval(mut self, interval_ms: u64) -> Self {
        self.config.min_request_interval_ms = interval_ms;
        self
    }

    /// Set batch chunking parameters.
    pub fn with_batch_chunking(mut self, chunk_size: usize, chunk_delay_ms: u64) -> Self {
        self.config.batch_chunk_size = chunk_size;
        self.config.batch_chunk_delay_ms = chunk_delay_ms;
        self
    }

    /// Set the oracle refresh period.
    pub fn with_oracle_refresh(mut self, refresh_seconds: u64) -> Self {
        self.config.oracle_refresh_seconds = refresh_seconds;
        self
    }

    /// Take the configuration without building services.
    pub fn build_config(self) -> PricingConfig {
        self.config
    }

    /// Build the production pricing stack over a shared HTTP client.
    pub fn build(self, http: Client) -> (Arc<SolPriceOracle>, Arc<MarketDataService>) {
        let pairs: Arc<dyn PairSource> =
            Arc::new(DexScreenerClient::new(http.clone(), &self.config));

        let mut sources = NonEmpty::new(
            Arc::new(CoinGeckoSolSource::new(http.clone(), &self.config))
                as Arc<dyn SolPriceSource>,
        );
        sources.push(Arc::new(JupiterSolSource::new(http, &self.config)));
        sources.push(Arc::new(AggregatorSolSource::new(pairs.clone())));

        let oracle = Arc::new(SolPriceOracle::new(sources, &self.config));
        let store = Arc::new(MokaPriceStore::new(&self.config));
        let service = Arc::new(MarketDataService::new(
            store,
            pairs,
            oracle.clone(),
            &self.config,
        ));

        (oracle, service)
    }
}

impl Default for PricingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = PricingBuilder::new()
            .with_cache_ttl(600)
            .with_min_request_interval(250)
            .with_batch_chunking(10, 50)
            .build_config();

        assert_eq!(config.cache_ttl_seconds, 600);
        assert_eq!(config.min_request_interval_ms, 250);
        assert_eq!(config.batch_chunk_size, 10);
        assert_eq!(config.batch_chunk_delay_ms, 50);
    }

    #[test]
    fn test_builder_defaults() {
        let config = PricingBuilder::new().build_config();

        assert_eq!(config.cache_ttl_seconds, 300);
        assert_eq!(config.min_request_interval_ms, 100);
        assert_eq!(config.batch_chunk_size, 5);
    }

    #[tokio::test]
    async fn test_build_wires_stack() {
        let (oracle, service) = PricingBuilder::new().build(Client::new());

        assert!(oracle.current_price_usd() > 0.0);
        assert_eq!(service.stats(), ServiceStats::default());
    }
}
