//! Process-wide SOL/USD price oracle.
//!
//! Tries a fixed priority list of upstream sources, accepts the first
//! strictly-positive price, and keeps the last good value when every source
//! fails. A background task refreshes the value on a fixed period; a refresh
//! already in progress suppresses concurrent ones.

use crate::pricing::sources::SolPriceSource;
use crate::pricing::types::PricingConfig;
use nonempty::NonEmpty;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

/// SOL/USD reference price with source fallback and last-good retention.
pub struct SolPriceOracle {
    /// Sources in priority order; the first positive answer wins
    sources: NonEmpty<Arc<dyn SolPriceSource>>,
    /// Current price, stored as f64 bits for lock-free reads
    price_bits: AtomicU64,
    /// Guard so only one refresh runs at a time
    refreshing: AtomicBool,
    /// Period of the background refresh task
    refresh_interval: Duration,
}

impl SolPriceOracle {
    /// Create an oracle seeded with the configured default price. The
    /// default keeps conversions sane until the first successful refresh.
    pub fn new(sources: NonEmpty<Arc<dyn SolPriceSource>>, config: &PricingConfig) -> Self {
        Self {
            sources,
            price_bits: AtomicU64::new(config.default_sol_price_usd.to_bits()),
            refreshing: AtomicBool::new(false),
            refresh_interval: Duration::from_secs(config.oracle_refresh_seconds),
        }
    }

    /// The current SOL/USD price. Strictly positive once constructed:
    /// refreshes only ever replace it with another strictly-positive value.
    pub fn current_price_usd(&self) -> f64 {
        f64::from_bits(self.price_bits.load(Ordering::Relaxed))
    }

    /// Refresh the price from the source chain. Returns `true` when a new
    /// value was published. A refresh already in progress makes this a
    /// no-op returning `false`.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> bool {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            debug!("Refresh already in progress, skipping");
            return false;
        }

        let mut published = false;
        for source in self.sources.iter() {
            match source.fetch_price_usd().await {
                Ok(price) if price > 0.0 => {
                    self.price_bits.store(price.to_bits(), Ordering::Relaxed);
                    info!("SOL price updated to ${:.2} via {}", price, source.name());
                    published = true;
                    break;
                }
                Ok(price) => {
                    warn!(
                        "Source {} returned non-positive SOL price {}, trying next",
                        source.name(),
                        price
                    );
                }
                Err(e) => {
                    warn!("Source {} failed: {:#}, trying next", source.name(), e);
                }
            }
        }

        if !published {
            warn!(
                "All SOL price sources failed, keeping last good value ${:.2}",
                self.current_price_usd()
            );
        }

        self.refreshing.store(false, Ordering::SeqCst);
        published
    }

    /// Spawn the periodic refresh task. The first refresh runs immediately.
    /// The caller owns the handle and aborts it on shutdown.
    pub fn spawn_refresh_task(self: Arc<Self>) -> JoinHandle<()> {
        let oracle = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(oracle.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                oracle.refresh().await;
            }
        })
    }

    /// Convert a SOL amount to USD at the current price.
    pub fn sol_to_usd(&self, sol: f64) -> f64 {
        sol * self.current_price_usd()
    }

    /// Convert a USD amount to SOL at the current price.
    pub fn usd_to_sol(&self, usd: f64) -> f64 {
        let price = self.current_price_usd();
        if price > 0.0 {
            usd / price
        } else {
            0.0
        }
    }

    /// Unrealized PnL in SOL for a position valued in USD: what the tokens
    /// are worth in SOL minus what was spent. Returns 0.0 when the position
    /// or its price is missing or non-positive.
    pub fn unrealized_pnl_sol(
        &self,
        token_amount: f64,
        token_price_usd: f64,
        sol_spent: f64,
    ) -> f64 {
        if token_amount <= 0.0 || token_price_usd <= 0.0 {
            return 0.0;
        }
        self.usd_to_sol(token_amount * token_price_usd) - sol_spent
    }
}
