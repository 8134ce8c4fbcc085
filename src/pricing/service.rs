//! Market-data cache service.
//!
//! Read-through cache over the shared price store: cache hits return
//! immediately, misses pay their turn at the upstream rate gate, fetch the
//! mint's trading pairs, select the deepest pool, and cache the result under
//! the store TTL. Absence (no tradable pair, upstream failure) is never
//! cached, so a later successful fetch is not blocked by a stale miss.

use crate::pricing::oracle::SolPriceOracle;
use crate::pricing::sources::PairSource;
use crate::pricing::store::PriceStore;
use crate::pricing::types::{MarketDataRecord, PricingConfig, TokenPair};
use crate::types::Mint;
use futures::future::join_all;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Counters exposed for operational visibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_errors: u64,
    pub not_found: u64,
}

/// Resolves token market data through the shared cache, serializing upstream
/// traffic behind a minimum-interval gate.
pub struct MarketDataService {
    store: Arc<dyn PriceStore>,
    pairs: Arc<dyn PairSource>,
    oracle: Arc<SolPriceOracle>,
    /// One permit per minimum interval; cache hits never touch this
    gate: DefaultDirectRateLimiter,
    chunk_size: usize,
    chunk_delay: Duration,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_errors: AtomicU64,
    not_found: AtomicU64,
}

impl MarketDataService {
    /// Wire the service over its collaborators.
    pub fn new(
        store: Arc<dyn PriceStore>,
        pairs: Arc<dyn PairSource>,
        oracle: Arc<SolPriceOracle>,
        config: &PricingConfig,
    ) -> Self {
        let period = Duration::from_millis(config.min_request_interval_ms.max(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(10).unwrap()));

        Self {
            store,
            pairs,
            oracle,
            gate: RateLimiter::direct(quota),
            chunk_size: config.batch_chunk_size.max(1),
            chunk_delay: Duration::from_millis(config.batch_chunk_delay_ms),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
        }
    }

    /// Market data for one mint. `None` means the mint has no discoverable
    /// market right now, whether because no pair exists or because the
    /// upstream was unavailable; neither outcome is cached.
    #[instrument(skip(self), fields(mint = %mint))]
    pub async fn get_market_data(&self, mint: &str) -> Option<MarketDataRecord> {
        if let Some(record) = self.store.get(mint).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(record);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Wait our turn at the upstream gate. Concurrent misses queue behind
        // each other here, spacing upstream calls by the minimum interval.
        self.gate.until_ready().await;

        let pairs = match self.pairs.token_pairs(mint).await {
            Ok(pairs) => pairs,
            Err(e) => {
                self.upstream_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Upstream pair lookup failed for {}: {:#}", mint, e);
                return None;
            }
        };

        let Some(best) = Self::select_best_pair(&pairs) else {
            self.not_found.fetch_add(1, Ordering::Relaxed);
            debug!("No trading pairs for {}", mint);
            return None;
        };

        let record = MarketDataRecord::from_pair(mint, best, self.oracle.current_price_usd());
        if !record.has_price() {
            self.not_found.fetch_add(1, Ordering::Relaxed);
            debug!("Best pair for {} carries no usable price", mint);
            return None;
        }

        self.store.put(record.clone()).await;
        Some(record)
    }

    /// Market data for a set of mints, resolved in chunks of
    /// `batch_chunk_size` with a fixed pause between chunks. One mint's
    /// failure resolves to `None` for that mint only.
    #[instrument(skip(self, mints), fields(count = mints.len()))]
    pub async fn get_batch(&self, mints: &[Mint]) -> HashMap<Mint, Option<MarketDataRecord>> {
        // Batch input is a set; drop duplicates while keeping first-seen order.
        let mut seen = std::collections::HashSet::new();
        let unique: Vec<&Mint> = mints.iter().filter(|m| seen.insert(m.as_str())).collect();

        let mut results = HashMap::with_capacity(unique.len());
        let chunks: Vec<&[&Mint]> = unique.chunks(self.chunk_size).collect();
        let total_chunks = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let resolved = join_all(chunk.iter().map(|mint| async move {
                (mint.to_string(), self.get_market_data(mint).await)
            }))
            .await;
            results.extend(resolved);

            if index + 1 < total_chunks {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        results
    }

    /// The deepest pool wins; ties keep the first-encountered pair so
    /// selection is deterministic for equal books.
    fn select_best_pair(pairs: &[TokenPair]) -> Option<&TokenPair> {
        let mut best: Option<&TokenPair> = None;
        for pair in pairs {
            match best {
                Some(current) if pair.liquidity_usd > current.liquidity_usd => {
                    best = Some(pair);
                }
                None => best = Some(pair),
                _ => {}
            }
        }
        best
    }

    /// Snapshot of the service counters.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
        }
    }
}
