//! Core types and data structures for the walletscope PnL pipeline.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A token mint address (kept as a string to avoid pulling Solana SDK types
/// into the pricing core).
pub type Mint = String;

/// Aggregated position of one wallet in one token, as supplied by the
/// wallet-ledger storage layer.
///
/// All fields are cumulative over the wallet's trade history. `tokens_sold
/// <= tokens_bought` is expected from a consistent ledger but not enforced
/// here; the PnL calculator degrades gracefully when it does not hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletHolding {
    /// The wallet address
    pub wallet: String,
    /// Total tokens ever bought
    pub tokens_bought: f64,
    /// Total tokens ever sold
    pub tokens_sold: f64,
    /// Total SOL spent buying
    pub sol_spent: f64,
    /// Total SOL received selling
    pub sol_received: f64,
}

/// Profit/loss figures for one token across a set of wallet holdings,
/// denominated in SOL. Derived on demand, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlResult {
    /// Tokens currently held (bought minus sold, summed over wallets)
    pub total_tokens_held: f64,
    /// Total SOL spent acquiring the position
    pub total_spent_sol: f64,
    /// Current market value of the held tokens
    pub current_value_sol: f64,
    /// Profit realized by completed sells
    pub realized_pnl_sol: f64,
    /// Paper profit on the remaining position
    pub unrealized_pnl_sol: f64,
    /// Realized plus unrealized
    pub total_pnl_sol: f64,
}

/// A cached value together with the moment it was cached.
///
/// An entry is logically present only while `is_fresh` holds; callers treat
/// an expired entry exactly like a missing one even if it has not been
/// evicted yet.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,
    /// When the value was cached
    pub cached_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Wrap a value with the current timestamp.
    pub fn new(value: T) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
        }
    }

    /// Time elapsed since the value was cached.
    pub fn age(&self) -> Duration {
        self.cached_at.elapsed()
    }

    /// Whether the entry is still valid under the given TTL.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}
