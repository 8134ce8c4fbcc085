//! Upstream market-data clients.
//!
//! This module owns all outbound HTTP: the aggregator that lists a token's
//! trading pairs, and the independent sources the SOL/USD oracle falls
//! through. Every call carries an explicit timeout; failures are returned
//! as errors for the caller to translate (cache absence, last-good value).

use crate::pricing::types::{PricingConfig, TokenPair, TokenPairsResponse};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Wrapped SOL mint, used to price SOL itself through the aggregator.
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Source of trading pairs for a token mint.
#[async_trait]
pub trait PairSource: Send + Sync {
    /// All pairs the aggregator knows for `mint`. An empty vec means the
    /// token has no discoverable market; errors mean the source itself was
    /// unreachable.
    async fn token_pairs(&self, mint: &str) -> Result<Vec<TokenPair>>;
}

/// DexScreener token-pairs client (`GET {base}/tokens/{mint}`).
pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl DexScreenerClient {
    /// Create a client over a shared HTTP connection pool.
    pub fn new(http: Client, config: &PricingConfig) -> Self {
        Self {
            http,
            base_url: config.market_api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }
}

#[async_trait]
impl PairSource for DexScreenerClient {
    #[instrument(skip(self), fields(mint = %mint))]
    async fn token_pairs(&self, mint: &str) -> Result<Vec<TokenPair>> {
        let url = format!("{}/tokens/{}", self.base_url, mint);

        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach market aggregator")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Market aggregator returned {} for {}",
                response.status(),
                mint
            ));
        }

        let body: TokenPairsResponse = response
            .json()
            .await
            .context("Failed to parse token pairs response")?;

        let pairs: Vec<TokenPair> = body
            .pairs
            .unwrap_or_default()
            .iter()
            .map(|p| p.to_token_pair())
            .collect();

        debug!("Fetched {} pairs for {}", pairs.len(), mint);
        Ok(pairs)
    }
}

/// One upstream source of the SOL/USD reference price.
#[async_trait]
pub trait SolPriceSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Current SOL/USD price. Implementations return an error on transport
    /// or parse failure; the oracle treats non-positive values as failures
    /// too.
    async fn fetch_price_usd(&self) -> Result<f64>;
}

/// CoinGecko simple-price endpoint.
pub struct CoinGeckoSolSource {
    http: Client,
    timeout: Duration,
}

impl CoinGeckoSolSource {
    pub fn new(http: Client, config: &PricingConfig) -> Self {
        Self {
            http,
            timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }
}

/// Extract the SOL price from a CoinGecko simple-price payload.
pub(crate) fn parse_coingecko_price(body: &serde_json::Value) -> Result<f64> {
    body["solana"]["usd"]
        .as_f64()
        .context("Failed to parse SOL price from CoinGecko")
}

#[async_trait]
impl SolPriceSource for CoinGeckoSolSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    #[instrument(skip(self))]
    async fn fetch_price_usd(&self) -> Result<f64> {
        let url = "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd";

        let body = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach CoinGecko")?
            .json::<serde_json::Value>()
            .await
            .context("Failed to parse CoinGecko response")?;

        let price = parse_coingecko_price(&body)?;
        debug!("CoinGecko SOL price: ${:.2}", price);
        Ok(price)
    }
}

/// Jupiter price endpoint.
pub struct JupiterSolSource {
    http: Client,
    timeout: Duration,
}

impl JupiterSolSource {
    pub fn new(http: Client, config: &PricingConfig) -> Self {
        Self {
            http,
            timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }
}

/// Extract the SOL price from a Jupiter price payload. Jupiter has shipped
/// both string- and number-encoded prices, so both are accepted.
pub(crate) fn parse_jupiter_price(body: &serde_json::Value) -> Result<f64> {
    let price = &body["data"][WRAPPED_SOL_MINT]["price"];

    price
        .as_f64()
        .or_else(|| price.as_str().and_then(|s| s.parse::<f64>().ok()))
        .context("Failed to parse SOL price from Jupiter")
}

#[async_trait]
impl SolPriceSource for JupiterSolSource {
    fn name(&self) -> &'static str {
        "jupiter"
    }

    #[instrument(skip(self))]
    async fn fetch_price_usd(&self) -> Result<f64> {
        let url = format!(
            "https://lite-api.jup.ag/price/v2?ids={}",
            WRAPPED_SOL_MINT
        );

        let body = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach Jupiter")?
            .json::<serde_json::Value>()
            .await
            .context("Failed to parse Jupiter response")?;

        let price = parse_jupiter_price(&body)?;
        debug!("Jupiter SOL price: ${:.2}", price);
        Ok(price)
    }
}

/// SOL price through the pair aggregator itself: the deepest wrapped-SOL
/// pair's USD price. Last in the fallback chain since it reuses the same
/// upstream as token lookups.
pub struct AggregatorSolSource {
    pairs: Arc<dyn PairSource>,
}

impl AggregatorSolSource {
    pub fn new(pairs: Arc<dyn PairSource>) -> Self {
        Self { pairs }
    }
}

#[async_trait]
impl SolPriceSource for AggregatorSolSource {
    fn name(&self) -> &'static str {
        "aggregator"
    }

    #[instrument(skip(self))]
    async fn fetch_price_usd(&self) -> Result<f64> {
        let pairs = self.pairs.token_pairs(WRAPPED_SOL_MINT).await?;

        let best = pairs
            .iter()
            .filter(|p| p.price_usd > 0.0)
            .max_by(|a, b| a.liquidity_usd.total_cmp(&b.liquidity_usd))
            .ok_or_else(|| anyhow!("No priced wrapped-SOL pair available"))?;

        debug!("Aggregator SOL price: ${:.2}", best.price_usd);
        Ok(best.price_usd)
    }
}
