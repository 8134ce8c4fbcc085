//! Token PnL arithmetic.
//!
//! Pure functions from aggregated wallet holdings plus a market snapshot to
//! realized/unrealized/total PnL in SOL. Missing price data yields a zeroed
//! result instead of an error: tokens routinely lose their market, and that
//! must not break the portfolio view.

use crate::pricing::types::MarketDataRecord;
use crate::types::{PnlResult, WalletHolding};
use tracing::warn;

/// Cost basis of the sold portion of one holding, allocated proportionally
/// over cumulative buys. A holding reporting sells without buys is a ledger
/// anomaly; its sold-cost term is 0 so the result stays finite.
fn sold_cost_basis(holding: &WalletHolding) -> f64 {
    if holding.tokens_bought > 0.0 {
        holding.sol_spent * (holding.tokens_sold / holding.tokens_bought)
    } else {
        if holding.tokens_sold > 0.0 {
            warn!(
                wallet = %holding.wallet,
                tokens_sold = holding.tokens_sold,
                "Holding has sells without buys, treating sold cost basis as 0"
            );
        }
        0.0
    }
}

/// Compute PnL for one token across all wallets holding it.
///
/// `market` of `None` (or a snapshot without a SOL price) produces an
/// all-zero result. The cost basis of sold tokens is proportional, not lot
/// accounting: the ledger supplies only cumulative aggregates per wallet.
pub fn compute_token_metrics(
    holdings: &[WalletHolding],
    market: Option<&MarketDataRecord>,
) -> PnlResult {
    let price_sol = match market {
        Some(record) if record.price_sol > 0.0 => record.price_sol,
        _ => return PnlResult::default(),
    };

    let mut total_tokens_held = 0.0;
    let mut total_spent_sol = 0.0;
    let mut total_received_sol = 0.0;
    let mut total_sold_basis_sol = 0.0;

    for holding in holdings {
        total_tokens_held += holding.tokens_bought - holding.tokens_sold;
        total_spent_sol += holding.sol_spent;
        total_received_sol += holding.sol_received;
        total_sold_basis_sol += sold_cost_basis(holding);
    }

    let current_value_sol = total_tokens_held * price_sol;
    let realized_pnl_sol = total_received_sol - total_sold_basis_sol;
    let unrealized_pnl_sol = current_value_sol - (total_spent_sol - total_sold_basis_sol);

    PnlResult {
        total_tokens_held,
        total_spent_sol,
        current_value_sol,
        realized_pnl_sol,
        unrealized_pnl_sol,
        total_pnl_sol: realized_pnl_sol + unrealized_pnl_sol,
    }
}
