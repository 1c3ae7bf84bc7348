//! Prometheus metrics for the feed, the info endpoint and the aggregators.
//!
//! Counters and histograms are recorded through the `metrics` facade and are
//! no-ops until a recorder is installed with [`install_prometheus`].

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// WebSocket frame handling latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// WebSocket frames received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// Unparseable frames counter metric name.
pub const METRIC_WS_FRAMES_DROPPED: &str = "ws_frames_dropped_total";
/// Sends attempted while not open counter metric name.
pub const METRIC_WS_SENDS_DROPPED: &str = "ws_sends_dropped_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// Reconnect give-ups counter metric name.
pub const METRIC_WS_GIVE_UPS: &str = "ws_give_ups_total";
/// Connected gauge metric name.
pub const METRIC_WS_CONNECTED: &str = "ws_connected";
/// Handler failures counter metric name.
pub const METRIC_HANDLER_FAILURES: &str = "handler_failures_total";
/// Info request latency metric name.
pub const METRIC_INFO_LATENCY: &str = "info_request_latency_ms";
/// Info request failures counter metric name.
pub const METRIC_INFO_FAILURES: &str = "info_request_failures_total";
/// Candle seed latency metric name.
pub const METRIC_SEED_LATENCY: &str = "candle_seed_latency_ms";
/// Stale seeds discarded counter metric name.
pub const METRIC_SEED_DISCARDED: &str = "candle_seeds_discarded_total";
/// Live candle upserts counter metric name.
pub const METRIC_CANDLE_UPSERTS: &str = "candle_upserts_total";
/// Funding fetch latency metric name.
pub const METRIC_FUNDING_LATENCY: &str = "funding_fetch_latency_ms";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once and describe all metrics.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Handle of the installed recorder, if any.
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Initialize all metric descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket frame decode and dispatch latency in milliseconds"
    );
    describe_histogram!(METRIC_INFO_LATENCY, "Info endpoint request latency in milliseconds");
    describe_histogram!(METRIC_SEED_LATENCY, "Historical candle seed latency in milliseconds");
    describe_histogram!(METRIC_FUNDING_LATENCY, "Funding fetch latency in milliseconds");

    describe_counter!(METRIC_WS_MESSAGES_RECEIVED, "Total number of WebSocket frames received");
    describe_counter!(METRIC_WS_FRAMES_DROPPED, "Frames dropped because they failed to parse");
    describe_counter!(METRIC_WS_SENDS_DROPPED, "Control messages not sent because the socket was not open");
    describe_counter!(METRIC_WS_RECONNECTS, "Total number of WebSocket reconnect attempts");
    describe_counter!(METRIC_WS_GIVE_UPS, "Times the reconnect cap was reached");
    describe_counter!(METRIC_HANDLER_FAILURES, "Message handlers that returned an error or panicked");
    describe_counter!(METRIC_INFO_FAILURES, "Info endpoint requests that failed");
    describe_counter!(METRIC_SEED_DISCARDED, "Candle seeds discarded because the selection changed");
    describe_counter!(METRIC_CANDLE_UPSERTS, "Live candles applied to the selected series");

    describe_gauge!(METRIC_WS_CONNECTED, "1 while the WebSocket is open");

    debug!("Metrics initialized");
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Record info request latency.
pub fn record_info_latency(request: &'static str, elapsed: Duration) {
    histogram!(METRIC_INFO_LATENCY, "request" => request).record(millis(elapsed));
}

/// Record candle seed latency.
pub fn record_seed_latency(elapsed: Duration) {
    histogram!(METRIC_SEED_LATENCY).record(millis(elapsed));
}

/// Record funding fetch latency.
pub fn record_funding_latency(elapsed: Duration) {
    histogram!(METRIC_FUNDING_LATENCY).record(millis(elapsed));
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment dropped frames counter.
pub fn inc_ws_frames_dropped() {
    counter!(METRIC_WS_FRAMES_DROPPED).increment(1);
}

/// Increment dropped sends counter.
pub fn inc_ws_sends_dropped() {
    counter!(METRIC_WS_SENDS_DROPPED).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

/// Increment give-ups counter.
pub fn inc_ws_give_ups() {
    counter!(METRIC_WS_GIVE_UPS).increment(1);
}

/// Set the connected gauge.
pub fn set_ws_connected(connected: bool) {
    gauge!(METRIC_WS_CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

/// Increment handler failures counter.
pub fn inc_handler_failures() {
    counter!(METRIC_HANDLER_FAILURES).increment(1);
}

/// Increment info failures counter.
pub fn inc_info_failures(request: &'static str) {
    counter!(METRIC_INFO_FAILURES, "request" => request).increment(1);
}

/// Increment stale seeds counter.
pub fn inc_seed_discarded() {
    counter!(METRIC_SEED_DISCARDED).increment(1);
}

/// Increment candle upserts counter.
pub fn inc_candle_upserts() {
    counter!(METRIC_CANDLE_UPSERTS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        millis(self.start.elapsed())
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for WebSocket frame handling.
pub fn timer_ws_message() -> LatencyTimer {
    LatencyTimer::new(METRIC_WS_MESSAGE_LATENCY)
}
