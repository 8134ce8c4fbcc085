//! Walletscope service binary.
//!
//! Wires the pricing stack (oracle, cache service, preload queue) and serves
//! the inbound price API until interrupted.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use walletscope::client::preload::{PreloadConfig, PreloadQueue};
use walletscope::pricing::types::PricingConfig;
use walletscope::pricing::PricingBuilder;
use walletscope::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting walletscope pricing service");

    let config = config_from_env()?;
    let listen_addr: SocketAddr = std::env::var("WALLETSCOPE_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("Invalid WALLETSCOPE_LISTEN address")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    let (oracle, service) = PricingBuilder::from_config(config).build(http);

    // First oracle refresh runs immediately, then on the configured period.
    let refresh_task = oracle.clone().spawn_refresh_task();

    let preload = PreloadQueue::new(service.clone(), PreloadConfig::default());
    let state = Arc::new(AppState {
        service,
        preload: preload.clone(),
    });

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!("Listening on {}", listen_addr);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    refresh_task.abort();
    preload.shutdown().await;

    Ok(())
}

/// Defaults with a few environment overrides for deployment tuning.
fn config_from_env() -> Result<PricingConfig> {
    let mut config = PricingConfig::default();

    if let Ok(ttl) = std::env::var("WALLETSCOPE_CACHE_TTL_SECS") {
        config.cache_ttl_seconds = ttl
            .parse()
            .context("Invalid WALLETSCOPE_CACHE_TTL_SECS")?;
    }
    if let Ok(interval) = std::env::var("WALLETSCOPE_MIN_INTERVAL_MS") {
        config.min_request_interval_ms = interval
            .parse()
            .context("Invalid WALLETSCOPE_MIN_INTERVAL_MS")?;
    }
    if let Ok(base) = std::env::var("WALLETSCOPE_MARKET_API_BASE") {
        config.market_api_base = base;
    }

    Ok(config)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
