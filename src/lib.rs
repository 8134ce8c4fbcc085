//! Walletscope - Solana wallet PnL monitoring service.
//!
//! This crate implements the price/PnL caching and request-coalescing
//! pipeline: a TTL'd market-data cache over rate-limited upstream sources, a
//! SOL/USD fallback oracle, pure PnL math, and the client-side preload queue
//! and request coalescer that keep bursty UI demand bounded.

pub mod client;
pub mod pricing;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use pricing::{MarketDataRecord, MarketDataService, PricingBuilder, SolPriceOracle};
pub use types::{Mint, PnlResult, WalletHolding};
