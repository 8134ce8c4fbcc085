//! Per-view PnL request coalescer.
//!
//! Each dashboard view owns one coalescer. Given the view's changing list of
//! tokens of interest, it serves fresh local-cache entries instantly,
//! debounces the rest into a single batch fetch, cancels a superseded
//! in-flight fetch so responses are never applied out of order, and retries
//! transient failures with exponential backoff. After retries are exhausted
//! the error is surfaced while previously published data stays visible:
//! stale-but-present beats empty.

use crate::pricing::pnl::compute_token_metrics;
use crate::pricing::service::MarketDataService;
use crate::pricing::types::MarketDataRecord;
use crate::types::{CacheEntry, Mint, PnlResult, WalletHolding};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument, warn};

/// One token's PnL as shown to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPnl {
    pub mint: Mint,
    pub pnl: PnlResult,
    /// The market snapshot the PnL was derived from, when one existed
    pub market: Option<MarketDataRecord>,
    pub updated_at: DateTime<Utc>,
}

/// Source of PnL data for a batch of mints. The production implementation
/// joins the market-data service with the wallet ledger; tests inject mocks.
#[async_trait]
pub trait PnlSource: Send + Sync + 'static {
    async fn fetch_pnl_batch(&self, mints: &[Mint]) -> Result<HashMap<Mint, TokenPnl>>;
}

/// Read access to aggregated wallet holdings, supplied by the wallet-ledger
/// storage layer. Kept as a trait: the schema and its accessors live outside
/// this core.
#[async_trait]
pub trait HoldingsProvider: Send + Sync {
    async fn holdings_for_token(&self, mint: &str) -> Result<Vec<WalletHolding>>;
}

/// Production `PnlSource`: market data through the cache service, holdings
/// from the ledger, PnL computed per token.
pub struct ServicePnlSource {
    service: Arc<MarketDataService>,
    holdings: Arc<dyn HoldingsProvider>,
}

impl ServicePnlSource {
    pub fn new(service: Arc<MarketDataService>, holdings: Arc<dyn HoldingsProvider>) -> Self {
        Self { service, holdings }
    }
}

#[async_trait]
impl PnlSource for ServicePnlSource {
    #[instrument(skip(self, mints), fields(count = mints.len()))]
    async fn fetch_pnl_batch(&self, mints: &[Mint]) -> Result<HashMap<Mint, TokenPnl>> {
        let market = self.service.get_batch(mints).await;

        let mut results = HashMap::with_capacity(mints.len());
        for mint in mints {
            let record = market.get(mint).cloned().flatten();
            let holdings = self.holdings.holdings_for_token(mint).await?;
            let pnl = compute_token_metrics(&holdings, record.as_ref());

            results.insert(
                mint.clone(),
                TokenPnl {
                    mint: mint.clone(),
                    pnl,
                    market: record,
                    updated_at: Utc::now(),
                },
            );
        }
        Ok(results)
    }
}

/// Coalescer tuning knobs.
#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    /// Serve local-cache entries instead of refetching fresh ones
    pub enable_caching: bool,
    /// Freshness window for local-cache entries
    pub cache_ttl: Duration,
    /// Quiet period before a fetch is issued
    pub debounce: Duration,
    /// Retries after the initial attempt
    pub max_retries: usize,
    /// First retry delay; doubles on each subsequent retry
    pub base_retry_delay: Duration,
    /// Cache size above which stale entries are opportunistically evicted
    pub eviction_threshold: usize,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            enable_caching: true,
            cache_ttl: Duration::from_secs(30),
            debounce: Duration::from_millis(100),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(500),
            eviction_threshold: 100,
        }
    }
}

/// Local-cache counters for one coalescer instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoalescerStats {
    pub cached_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

struct CoalescerInner<S: PnlSource> {
    source: Arc<S>,
    config: CoalescerConfig,
    /// Mapping the caller reads; updated as data arrives
    visible: RwLock<HashMap<Mint, TokenPnl>>,
    /// Local cache with per-entry timestamps
    cache: Mutex<HashMap<Mint, CacheEntry<TokenPnl>>>,
    /// The view's current token list, for refresh()
    tokens: Mutex<Vec<Mint>>,
    /// Debounce-plus-fetch task for the current cycle
    in_flight: Mutex<Option<JoinHandle<()>>>,
    /// Monotonic request generation; a fetch only merges while current
    generation: AtomicU64,
    last_error: Mutex<Option<String>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Per-view cache and in-flight request manager over a `PnlSource`.
pub struct PnlCoalescer<S: PnlSource> {
    inner: Arc<CoalescerInner<S>>,
}

impl<S: PnlSource> PnlCoalescer<S> {
    pub fn new(source: Arc<S>, config: CoalescerConfig) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                source,
                config,
                visible: RwLock::new(HashMap::new()),
                cache: Mutex::new(HashMap::new()),
                tokens: Mutex::new(Vec::new()),
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                last_error: Mutex::new(None),
                cache_hits: AtomicU64::new(0),
                cache_misses: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the view's token list. Fresh cached entries are published
    /// immediately; the rest are debounced into one batch fetch, cancelling
    /// any fetch still in flight from a previous list.
    pub async fn set_tokens(&self, mints: Vec<Mint>) {
        self.apply_tokens(mints, false).await;
    }

    /// Re-fetch the current token list, bypassing the local cache.
    pub async fn refresh(&self) {
        let tokens = self.inner.tokens.lock().await.clone();
        self.apply_tokens(tokens, true).await;
    }

    /// The latest published PnL for a mint, if any.
    pub async fn get_token_pnl(&self, mint: &str) -> Option<TokenPnl> {
        self.inner.visible.read().await.get(mint).cloned()
    }

    /// Snapshot of the full caller-visible mapping.
    pub async fn snapshot(&self) -> HashMap<Mint, TokenPnl> {
        self.inner.visible.read().await.clone()
    }

    /// The terminal error of the last fetch cycle, cleared by the next
    /// successful one. Previously published data stays available alongside.
    pub async fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().await.clone()
    }

    /// Local-cache counters.
    pub async fn cache_stats(&self) -> CoalescerStats {
        CoalescerStats {
            cached_entries: self.inner.cache.lock().await.len(),
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.inner.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Cancel the in-flight fetch, if any.
    pub async fn shutdown(&self) {
        // Bump the generation so a fetch past its abort point cannot merge.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mut in_flight = self.inner.in_flight.lock().await;
        if let Some(task) = in_flight.take() {
            task.abort();
        }
    }

    async fn apply_tokens(&self, mints: Vec<Mint>, bypass_cache: bool) {
        let inner = &self.inner;
        *inner.tokens.lock().await = mints.clone();

        let wanted: HashSet<&str> = mints.iter().map(|m| m.as_str()).collect();
        let mut needs_fetch: Vec<Mint> = Vec::new();

        {
            let cache = inner.cache.lock().await;
            let mut visible = inner.visible.write().await;

            // The view is the token list; drop entries it no longer shows.
            visible.retain(|mint, _| wanted.contains(mint.as_str()));

            for mint in &mints {
                if !bypass_cache && inner.config.enable_caching {
                    if let Some(entry) = cache.get(mint) {
                        if entry.is_fresh(inner.config.cache_ttl) {
                            inner.cache_hits.fetch_add(1, Ordering::Relaxed);
                            visible.insert(mint.clone(), entry.value.clone());
                            continue;
                        }
                    }
                }
                inner.cache_misses.fetch_add(1, Ordering::Relaxed);
                needs_fetch.push(mint.clone());
            }
        }

        if needs_fetch.is_empty() {
            return;
        }

        // Supersede: the new cycle owns the generation, and the previous
        // debounce-or-fetch task is aborted outright rather than left to
        // race its response against ours.
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut in_flight = inner.in_flight.lock().await;
        if let Some(previous) = in_flight.take() {
            previous.abort();
            debug!("Cancelled superseded in-flight fetch");
        }

        let task_inner = inner.clone();
        *in_flight = Some(tokio::spawn(async move {
            tokio::time::sleep(task_inner.config.debounce).await;
            CoalescerInner::run_fetch(&task_inner, generation, needs_fetch).await;
        }));
    }
}

impl<S: PnlSource> CoalescerInner<S> {
    /// Fetch with retries, then merge if this cycle is still the current
    /// one. A superseded response is discarded, never merged.
    async fn run_fetch(inner: &Arc<Self>, generation: u64, mints: Vec<Mint>) {
        // Doubling backoff: base, 2x, 4x, ...
        let factor = (inner.config.base_retry_delay.as_millis() as u64 / 2).max(1);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(factor)
            .take(inner.config.max_retries);

        let mut attempts = 0u32;
        let result = Retry::spawn(strategy, || {
            attempts += 1;
            if attempts > 1 {
                debug!("Retrying PnL fetch, attempt {}", attempts);
            }
            inner.source.fetch_pnl_batch(&mints)
        })
        .await;

        if inner.generation.load(Ordering::SeqCst) != generation {
            debug!("Fetch superseded before merge, discarding response");
            return;
        }

        match result {
            Ok(fetched) => {
                let mut cache = inner.cache.lock().await;
                let mut visible = inner.visible.write().await;
                for (mint, entry) in fetched {
                    cache.insert(mint.clone(), CacheEntry::new(entry.clone()));
                    visible.insert(mint, entry);
                }
                Self::evict_stale(&mut cache, &inner.config);
                *inner.last_error.lock().await = None;
            }
            Err(e) => {
                warn!(
                    "PnL fetch failed after {} attempt(s): {:#}; keeping last good data",
                    attempts, e
                );
                *inner.last_error.lock().await = Some(format!("{e:#}"));
            }
        }
    }

    /// Drop entries older than twice the TTL once the cache is over the
    /// threshold. Bounds memory without a hard cap on the publish path.
    fn evict_stale(cache: &mut HashMap<Mint, CacheEntry<TokenPnl>>, config: &CoalescerConfig) {
        if cache.len() <= config.eviction_threshold {
            return;
        }
        let horizon = config.cache_ttl * 2;
        let before = cache.len();
        cache.retain(|_, entry| entry.age() < horizon);
        debug!("Evicted {} stale PnL cache entries", before - cache.len());
    }
}
