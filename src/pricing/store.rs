//! Shared price cache store.
//!
//! The market-data service owns the `price:{mint}` namespace of a shared
//! key/value store with store-enforced TTL. The trait keeps the service
//! independent of where the store lives; the bundled implementation is an
//! in-process moka cache, and a networked store can implement the same
//! contract.

use crate::pricing::types::{MarketDataRecord, PricingConfig};
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Atomic get/set-with-expiry over serialized market records.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// The unexpired record for `mint`, if any. Expired entries are absent.
    async fn get(&self, mint: &str) -> Option<MarketDataRecord>;

    /// Store a record under the configured TTL.
    async fn put(&self, record: MarketDataRecord);
}

/// In-process `PriceStore` backed by a moka cache with TTL eviction.
pub struct MokaPriceStore {
    cache: Cache<String, MarketDataRecord>,
}

impl MokaPriceStore {
    /// Build a store with the configured TTL and capacity.
    pub fn new(config: &PricingConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_cache_entries)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .build();

        Self { cache }
    }

    /// Key under the price namespace.
    fn key(mint: &str) -> String {
        format!("price:{}", mint)
    }
}

#[async_trait]
impl PriceStore for MokaPriceStore {
    async fn get(&self, mint: &str) -> Option<MarketDataRecord> {
        let hit = self.cache.get(&Self::key(mint)).await;
        debug!(mint, hit = hit.is_some(), "Price store lookup");
        hit
    }

    async fn put(&self, record: MarketDataRecord) {
        self.cache.insert(Self::key(&record.mint), record).await;
    }
}
