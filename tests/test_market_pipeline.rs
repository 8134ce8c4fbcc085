//! End-to-end tests for the pricing pipeline: cache service over a fake
//! aggregator, PnL derivation, preload warming, and the client coalescer
//! driving the whole stack.

use anyhow::Result;
use async_trait::async_trait;
use nonempty::NonEmpty;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use walletscope::client::coalescer::{
    CoalescerConfig, HoldingsProvider, PnlCoalescer, ServicePnlSource,
};
use walletscope::client::preload::{PreloadConfig, PreloadQueue};
use walletscope::pricing::sources::{PairSource, SolPriceSource};
use walletscope::pricing::store::MokaPriceStore;
use walletscope::pricing::types::{PricingConfig, TokenPair};
use walletscope::pricing::{MarketDataService, SolPriceOracle};
use walletscope::types::{Mint, WalletHolding};

/// Fixed SOL/USD price for tests.
struct StaticSolSource(f64);

#[async_trait]
impl SolPriceSource for StaticSolSource {
    fn name(&self) -> &'static str {
        "static"
    }
    async fn fetch_price_usd(&self) -> Result<f64> {
        Ok(self.0)
    }
}

/// Aggregator stub: canned pairs per mint, counting upstream calls.
struct StubAggregator {
    pairs: Mutex<HashMap<String, Vec<TokenPair>>>,
    calls: AtomicUsize,
}

impl StubAggregator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pairs: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn add_pair(&self, mint: &str, pair_address: &str, liquidity_usd: f64, price_sol: f64) {
        self.pairs.lock().unwrap().entry(mint.to_string()).or_default().push(TokenPair {
            pair_address: pair_address.to_string(),
            dex_id: "raydium".to_string(),
            price_usd: price_sol * 150.0,
            price_sol,
            liquidity_usd,
            volume_24h_usd: 10_000.0,
            price_change_24h_pct: 1.5,
        });
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PairSource for StubAggregator {
    async fn token_pairs(&self, mint: &str) -> Result<Vec<TokenPair>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .unwrap_or_default())
    }
}

/// Ledger stub: one holding per known mint.
struct StubLedger {
    holdings: Mutex<HashMap<String, Vec<WalletHolding>>>,
}

impl StubLedger {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            holdings: Mutex::new(HashMap::new()),
        })
    }

    fn add_holding(&self, mint: &str, holding: WalletHolding) {
        self.holdings
            .lock()
            .unwrap()
            .entry(mint.to_string())
            .or_default()
            .push(holding);
    }
}

#[async_trait]
impl HoldingsProvider for StubLedger {
    async fn holdings_for_token(&self, mint: &str) -> Result<Vec<WalletHolding>> {
        Ok(self
            .holdings
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .unwrap_or_default())
    }
}

fn test_config() -> PricingConfig {
    PricingConfig {
        min_request_interval_ms: 1,
        batch_chunk_delay_ms: 50,
        ..PricingConfig::default()
    }
}

fn build_service(aggregator: Arc<StubAggregator>, config: &PricingConfig) -> Arc<MarketDataService> {
    let oracle = Arc::new(SolPriceOracle::new(
        NonEmpty::new(Arc::new(StaticSolSource(150.0)) as Arc<dyn SolPriceSource>),
        config,
    ));
    Arc::new(MarketDataService::new(
        Arc::new(MokaPriceStore::new(config)),
        aggregator,
        oracle,
        config,
    ))
}

fn mints(names: &[&str]) -> Vec<Mint> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_repeated_reads_within_ttl_make_one_upstream_call() {
    let aggregator = StubAggregator::new();
    aggregator.add_pair("MintA", "P1", 50_000.0, 0.002);
    let service = build_service(aggregator.clone(), &test_config());

    for _ in 0..5 {
        assert!(service.get_market_data("MintA").await.is_some());
    }

    assert_eq!(aggregator.call_count(), 1);
}

#[tokio::test]
async fn test_batch_of_twelve_is_chunked_with_delays() {
    let aggregator = StubAggregator::new();
    let names: Vec<String> = (0..12).map(|i| format!("Mint{i}")).collect();
    for name in &names {
        aggregator.add_pair(name, "P", 10_000.0, 0.001);
    }
    let config = test_config();
    let service = build_service(aggregator.clone(), &config);

    let started = Instant::now();
    let results = service.get_batch(&names).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 12);
    assert!(results.values().all(|r| r.is_some()));
    assert_eq!(aggregator.call_count(), 12);

    // Chunks of 5, 5, 2 mean two inter-chunk delays of 50 ms each.
    assert!(
        elapsed >= Duration::from_millis(100),
        "expected two chunk delays, batch finished in {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_preload_warms_cache_for_later_reads() {
    let aggregator = StubAggregator::new();
    aggregator.add_pair("MintA", "P1", 50_000.0, 0.002);
    aggregator.add_pair("MintB", "P2", 80_000.0, 0.004);
    let service = build_service(aggregator.clone(), &test_config());

    let queue = PreloadQueue::new(
        service.clone(),
        PreloadConfig {
            debounce_ms: 10,
            ..PreloadConfig::default()
        },
    );
    queue.request_preload(&mints(&["MintA", "MintB"])).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(aggregator.call_count(), 2);

    // Later reads are cache hits, no further upstream traffic.
    assert!(service.get_market_data("MintA").await.is_some());
    assert!(service.get_market_data("MintB").await.is_some());
    assert_eq!(aggregator.call_count(), 2);
}

#[tokio::test]
async fn test_coalescer_derives_pnl_through_the_stack() {
    let aggregator = StubAggregator::new();
    aggregator.add_pair("MintA", "Shallow", 50_000.0, 0.002);
    aggregator.add_pair("MintA", "Deep", 120_000.0, 0.0021);
    let service = build_service(aggregator.clone(), &test_config());

    let ledger = StubLedger::new();
    ledger.add_holding(
        "MintA",
        WalletHolding {
            wallet: "Wallet1".to_string(),
            tokens_bought: 100.0,
            tokens_sold: 40.0,
            sol_spent: 2.0,
            sol_received: 1.0,
        },
    );

    let source = Arc::new(ServicePnlSource::new(service, ledger));
    let coalescer = PnlCoalescer::new(
        source,
        CoalescerConfig {
            debounce: Duration::from_millis(10),
            ..CoalescerConfig::default()
        },
    );

    coalescer.set_tokens(mints(&["MintA"])).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let entry = coalescer
        .get_token_pnl("MintA")
        .await
        .expect("PnL should be published");

    // Deepest pair wins: price 0.0021 SOL over 60 held tokens.
    let market = entry.market.expect("market snapshot");
    assert_eq!(market.pair_address, "Deep");
    assert_eq!(market.price_sol, 0.0021);

    assert!((entry.pnl.current_value_sol - 0.126).abs() < 1e-9);
    assert!((entry.pnl.realized_pnl_sol - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_mint_flows_through_as_zero_pnl() {
    let aggregator = StubAggregator::new();
    let service = build_service(aggregator, &test_config());
    let ledger = StubLedger::new();
    ledger.add_holding(
        "Ghost",
        WalletHolding {
            wallet: "Wallet1".to_string(),
            tokens_bought: 10.0,
            tokens_sold: 0.0,
            sol_spent: 1.0,
            sol_received: 0.0,
        },
    );

    let source = Arc::new(ServicePnlSource::new(service, ledger));
    let coalescer = PnlCoalescer::new(
        source,
        CoalescerConfig {
            debounce: Duration::from_millis(10),
            ..CoalescerConfig::default()
        },
    );

    coalescer.set_tokens(mints(&["Ghost"])).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let entry = coalescer
        .get_token_pnl("Ghost")
        .await
        .expect("entry should exist even without market data");
    assert!(entry.market.is_none());
    assert_eq!(entry.pnl.total_pnl_sol, 0.0);
    assert!(coalescer.last_error().await.is_none());
}
