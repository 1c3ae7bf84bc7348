//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    candles, funding, health, liquidity, market, metrics, orderbook, ready, select_market, status,
    AppState,
};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        // Monitor views
        .route("/api/v1/status", get(status))
        .route("/api/v1/orderbook", get(orderbook))
        .route("/api/v1/liquidity", get(liquidity))
        .route("/api/v1/candles", get(candles))
        .route("/api/v1/funding", get(funding))
        .route("/api/v1/market", get(market).put(select_market))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
