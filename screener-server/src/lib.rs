//! Screener Server: REST API over the summary cache and update pipeline.
//!
//! Endpoints:
//! - `GET  /api/ema-data`: band-filtered rows with summary statistics
//! - `GET  /api/filtered-data`: band filter plus search and sort
//! - `GET  /api/status`: cache, checkpoint and manifest overview
//! - `POST /api/setup`: run a backfill
//! - `POST /api/update-data`: run the gated daily update
//! - `GET  /health`

pub mod error;
pub mod routes;
pub mod state;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use screener_runner::ScreenerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::{AppState, Clock, ProviderFactory};

/// Full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api_router())
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Bind and serve until Ctrl+C.
pub async fn serve(config: ScreenerConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.server.bind, config.server.port))?;

    let state = AppState::new(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("EMA screener listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

/// Default `tracing` subscriber: `RUST_LOG` or `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, stopping");
}
