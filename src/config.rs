//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::candles::CandleInterval;
use crate::error::MonitorError;
use crate::feed::ReconnectConfig;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Endpoints ===
    /// Streaming WebSocket URL.
    #[serde(default = "default_ws_url")]
    pub hyperliquid_ws_url: String,

    /// Info (request/response) endpoint URL.
    #[serde(default = "default_info_url")]
    pub hyperliquid_info_url: String,

    // === Market Selection ===
    /// Initially selected coin (e.g. BTC).
    #[serde(default = "default_coin")]
    pub market_coin: String,

    /// Initially selected candle interval (e.g. 1h).
    #[serde(default = "default_interval")]
    pub candle_interval: String,

    // === Connection ===
    /// Fixed delay between reconnect attempts in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts allowed before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Application-level ping interval in seconds (0 disables).
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_s: u64,

    // === Info Endpoint ===
    /// Info request timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    /// Funding-rate polling period in seconds.
    #[serde(default = "default_funding_poll")]
    pub funding_poll_interval_s: u64,

    /// Historical candle lookback window in days.
    #[serde(default = "default_seed_lookback")]
    pub seed_lookback_days: u64,

    // === Server Configuration ===
    /// HTTP server port for the API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Install the Prometheus recorder and serve /metrics.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_ws_url() -> String {
    "wss://api.hyperliquid.xyz/ws".to_string()
}

fn default_info_url() -> String {
    "https://api.hyperliquid.xyz/info".to_string()
}

fn default_coin() -> String {
    "BTC".to_string()
}

fn default_interval() -> String {
    "1h".to_string()
}

fn default_reconnect_delay() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat() -> u64 {
    30
}

fn default_http_timeout() -> u64 {
    10_000
}

fn default_funding_poll() -> u64 {
    30
}

fn default_seed_lookback() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hyperliquid_ws_url: default_ws_url(),
            hyperliquid_info_url: default_info_url(),
            market_coin: default_coin(),
            candle_interval: default_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_s: default_heartbeat(),
            http_timeout_ms: default_http_timeout(),
            funding_poll_interval_s: default_funding_poll(),
            seed_lookback_days: default_seed_lookback(),
            port: default_port(),
            metrics_enabled: default_true(),
            rust_log: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Load and validate.
    pub fn load_validated() -> crate::Result<Self> {
        Self::load()?.validated()
    }

    /// Return `self` if [`validate`](Self::validate) passes.
    pub fn validated(self) -> crate::Result<Self> {
        self.validate().map_err(MonitorError::InvalidConfig)?;
        Ok(self)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        check_url(&self.hyperliquid_ws_url, &["ws", "wss"], "HYPERLIQUID_WS_URL")?;
        check_url(&self.hyperliquid_info_url, &["http", "https"], "HYPERLIQUID_INFO_URL")?;

        if self.market_coin.trim().is_empty() {
            return Err("MARKET_COIN is required".to_string());
        }

        self.interval()?;

        if self.reconnect_delay_ms == 0 {
            return Err("RECONNECT_DELAY_MS must be greater than 0".to_string());
        }

        if self.funding_poll_interval_s == 0 {
            return Err("FUNDING_POLL_INTERVAL_S must be greater than 0".to_string());
        }

        if self.seed_lookback_days == 0 {
            return Err("SEED_LOOKBACK_DAYS must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Parsed candle interval.
    pub fn interval(&self) -> Result<CandleInterval, String> {
        CandleInterval::from_str(&self.candle_interval)
            .map_err(|_| format!("CANDLE_INTERVAL {:?} is not a known interval", self.candle_interval))
    }

    /// Reconnection policy for the streaming connection.
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::fixed(
            Duration::from_millis(self.reconnect_delay_ms),
            self.max_reconnect_attempts,
        )
    }

    /// Heartbeat period, if enabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_s > 0).then(|| Duration::from_secs(self.heartbeat_interval_s))
    }

    /// Funding polling period.
    pub fn funding_poll_interval(&self) -> Duration {
        Duration::from_secs(self.funding_poll_interval_s)
    }

    /// Historical seed window.
    pub fn seed_lookback(&self) -> Duration {
        Duration::from_secs(self.seed_lookback_days * 24 * 60 * 60)
    }
}

fn check_url(raw: &str, schemes: &[&str], name: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("{name} is not a valid URL: {e}"))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(format!(
            "{name} must use one of {:?}, got {}",
            schemes,
            parsed.scheme()
        ));
    }
    Ok(())
}
