//! Configuration and market-data types for the pricing pipeline.

use crate::types::Mint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for the pricing pipeline (cache service, oracle, upstream
/// clients). All timing knobs live here so tests can shrink them.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Base URL of the market-data aggregator
    pub market_api_base: String,
    /// TTL for cached market records, in seconds
    pub cache_ttl_seconds: u64,
    /// Upper bound on cached records
    pub max_cache_entries: u64,
    /// Minimum spacing between upstream market API calls, in milliseconds
    pub min_request_interval_ms: u64,
    /// Mints resolved concurrently per batch chunk
    pub batch_chunk_size: usize,
    /// Pause between batch chunks, in milliseconds
    pub batch_chunk_delay_ms: u64,
    /// Per-request timeout for upstream HTTP calls, in seconds
    pub request_timeout_seconds: u64,
    /// Refresh period of the SOL/USD oracle, in seconds
    pub oracle_refresh_seconds: u64,
    /// SOL/USD value used until the oracle's first successful refresh
    pub default_sol_price_usd: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            market_api_base: "https://api.dexscreener.com/latest/dex".to_string(),
            cache_ttl_seconds: 300,
            max_cache_entries: 10_000,
            min_request_interval_ms: 100,
            batch_chunk_size: 5,
            batch_chunk_delay_ms: 200,
            request_timeout_seconds: 10,
            oracle_refresh_seconds: 300,
            default_sol_price_usd: 150.0,
        }
    }
}

/// One token's latest known market snapshot, as stored in the price cache
/// and returned over the inbound API.
///
/// `price_sol` and `price_usd` are jointly meaningful: a mint with no
/// tradable pair is represented as absence, never as a zero-priced record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataRecord {
    /// The token mint this snapshot belongs to
    pub mint: Mint,
    /// Price in USD
    pub price_usd: f64,
    /// Price in SOL
    pub price_sol: f64,
    /// USD liquidity of the selected pair
    pub liquidity_usd: f64,
    /// 24h trading volume in USD
    pub volume_24h_usd: f64,
    /// 24h price change, percent
    pub price_change_24h_pct: f64,
    /// Address of the selected trading pair
    pub pair_address: String,
    /// DEX the selected pair trades on
    pub dex_id: String,
    /// When this snapshot was taken
    pub observed_at: DateTime<Utc>,
}

/// A trading pair for a token, parsed from the aggregator response.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    /// Pair (pool) address
    pub pair_address: String,
    /// DEX identifier (e.g. "raydium", "orca")
    pub dex_id: String,
    /// Token price in USD
    pub price_usd: f64,
    /// Token price in SOL; 0.0 when the aggregator omitted it
    pub price_sol: f64,
    /// Pool liquidity in USD
    pub liquidity_usd: f64,
    /// 24h volume in USD
    pub volume_24h_usd: f64,
    /// 24h price change, percent
    pub price_change_24h_pct: f64,
}

// --- Aggregator wire types (DexScreener token-pairs endpoint) ---

/// Response of `GET /tokens/{mint}`: zero or more pairs, `null` when the
/// aggregator knows nothing about the mint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<PairInfo>>,
}

/// Raw pair object. Prices come back string-encoded; nested objects may be
/// missing entirely for barely-traded tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairInfo {
    pub pair_address: String,
    pub dex_id: String,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub price_native: Option<String>,
    #[serde(default)]
    pub liquidity: Option<PairLiquidity>,
    #[serde(default)]
    pub volume: Option<PairVolume>,
    #[serde(default)]
    pub price_change: Option<PairPriceChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairLiquidity {
    #[serde(default)]
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairVolume {
    #[serde(default)]
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairPriceChange {
    #[serde(default)]
    pub h24: Option<f64>,
}

impl PairInfo {
    /// Parse the wire shape into a numeric `TokenPair`. Unparseable or
    /// missing numbers collapse to 0.0 rather than failing the whole
    /// response.
    pub fn to_token_pair(&self) -> TokenPair {
        let parse = |s: &Option<String>| {
            s.as_deref()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0)
        };

        TokenPair {
            pair_address: self.pair_address.clone(),
            dex_id: self.dex_id.clone(),
            price_usd: parse(&self.price_usd),
            price_sol: parse(&self.price_native),
            liquidity_usd: self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0),
            volume_24h_usd: self.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0),
            price_change_24h_pct: self
                .price_change
                .as_ref()
                .and_then(|p| p.h24)
                .unwrap_or(0.0),
        }
    }
}

impl MarketDataRecord {
    /// Build a record for `mint` from its selected pair. When the aggregator
    /// omitted the SOL-denominated price, it is derived from the USD price
    /// via the current SOL/USD rate.
    pub fn from_pair(mint: &str, pair: &TokenPair, sol_price_usd: f64) -> Self {
        let price_sol = if pair.price_sol > 0.0 {
            pair.price_sol
        } else if sol_price_usd > 0.0 {
            pair.price_usd / sol_price_usd
        } else {
            0.0
        };

        Self {
            mint: mint.to_string(),
            price_usd: pair.price_usd,
            price_sol,
            liquidity_usd: pair.liquidity_usd,
            volume_24h_usd: pair.volume_24h_usd,
            price_change_24h_pct: pair.price_change_24h_pct,
            pair_address: pair.pair_address.clone(),
            dex_id: pair.dex_id.clone(),
            observed_at: Utc::now(),
        }
    }

    /// Whether the record carries a usable price.
    pub fn has_price(&self) -> bool {
        self.price_usd > 0.0 && self.price_sol > 0.0
    }
}
