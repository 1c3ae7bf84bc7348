//! HTTP API handlers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::candles::CandleInterval;
use crate::feed::ConnectionStatus;
use crate::monitor::{MarketMonitor, MarketSelection};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// The market monitor.
    pub monitor: Arc<MarketMonitor>,
    /// Prometheus handle, if the recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Process start, for uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Create new app state.
    pub fn new(monitor: Arc<MarketMonitor>) -> Self {
        Self {
            monitor,
            metrics: None,
            started_at: Instant::now(),
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Check if the feed is connected.
    pub fn is_ready(&self) -> bool {
        self.monitor.status() == ConnectionStatus::Connected
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("monitor", &self.monitor)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the feed is connected.
    pub ready: bool,
    /// Connection status.
    pub connection: ConnectionStatus,
    /// Current selection.
    pub market: Option<MarketSelection>,
}

/// Status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Connection status.
    pub connection: ConnectionStatus,
    /// Current selection.
    pub market: Option<MarketSelection>,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Successful opens so far.
    pub connection_epoch: u64,
    /// Registered message handlers.
    pub handlers: usize,
    /// Candles held for the selected series.
    pub candles: usize,
    /// Seconds since start.
    pub uptime_secs: u64,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

/// Market switch request.
#[derive(Debug, Deserialize)]
pub struct SelectMarketRequest {
    /// Coin symbol.
    pub coin: String,
    /// Interval wire string, e.g. "15m".
    pub interval: String,
}

/// Market switch response.
#[derive(Debug, Serialize)]
pub struct SelectMarketResponse {
    /// Whether the selection changed.
    pub changed: bool,
    /// Selection now active.
    pub market: MarketSelection,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if connected, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let response = ReadyResponse {
        ready: state.is_ready(),
        connection: state.monitor.status(),
        market: state.monitor.selection(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let monitor = &state.monitor;
    let connection = monitor.connection();

    Json(StatusResponse {
        connection: connection.status(),
        market: monitor.selection(),
        reconnect_attempts: connection.reconnect_attempts(),
        connection_epoch: connection.connection_epoch(),
        handlers: connection.handler_count(),
        candles: monitor.candles().candles.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Normalized order book of the selected coin.
pub async fn orderbook(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.orderbook())
}

/// Depth and slippage for the latest book.
pub async fn liquidity(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.liquidity())
}

/// Candle and volume series of the selected market.
pub async fn candles(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.candles())
}

/// Latest funding snapshot, 404 until the first fetch succeeds.
pub async fn funding(State(state): State<AppState>) -> Response {
    match state.monitor.funding() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "funding not yet available"),
    }
}

/// Current selection.
pub async fn market(State(state): State<AppState>) -> Response {
    match state.monitor.selection() {
        Some(selection) => Json(selection).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no market selected"),
    }
}

/// Switch coin and interval.
pub async fn select_market(
    State(state): State<AppState>,
    Json(request): Json<SelectMarketRequest>,
) -> Response {
    let coin = request.coin.trim();
    if coin.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "coin must not be empty");
    }
    let Ok(interval) = CandleInterval::from_str(request.interval.trim()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown interval {:?}", request.interval),
        );
    };

    let changed = state.monitor.select_market(coin, interval);
    info!(coin, %interval, changed, "Market switch requested");

    Json(SelectMarketResponse {
        changed,
        market: MarketSelection::new(coin, interval),
    })
    .into_response()
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics disabled"),
    }
}
