//! Inbound HTTP boundary for the pricing core.
//!
//! Thin axum router consumed by the dashboard/API layer. Authentication is
//! handled by middleware in front of this router; handlers trust the caller
//! identity they are handed.

use crate::client::preload::PreloadQueue;
use crate::pricing::service::MarketDataService;
use crate::pricing::types::MarketDataRecord;
use crate::types::Mint;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared handler state.
pub struct AppState {
    pub service: Arc<MarketDataService>,
    pub preload: PreloadQueue,
}

#[derive(Debug, Deserialize)]
pub struct MintsRequest {
    pub mints: Vec<Mint>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Per-mint result; `null` marks a mint with no discoverable market
    pub results: HashMap<Mint, Option<MarketDataRecord>>,
}

#[derive(Debug, Serialize)]
pub struct PreloadResponse {
    pub accepted: usize,
}

/// Build the inbound router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/prices/batch", post(prices_batch))
        .route("/preload-prices", post(preload_prices))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Resolve market data for a batch of mints through the cache service.
async fn prices_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MintsRequest>,
) -> Json<BatchResponse> {
    debug!("Batch price request for {} mints", request.mints.len());
    let results = state.service.get_batch(&request.mints).await;
    Json(BatchResponse { results })
}

/// Queue mints for cache warming. Always accepted; the work happens
/// asynchronously and nothing is returned beyond the count taken.
async fn preload_prices(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MintsRequest>,
) -> (StatusCode, Json<PreloadResponse>) {
    let accepted = request.mints.len();
    state.preload.request_preload(&request.mints).await;
    (StatusCode::ACCEPTED, Json(PreloadResponse { accepted }))
}
