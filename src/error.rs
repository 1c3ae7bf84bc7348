//! Unified error types for the liquidity monitor.

use thiserror::Error;

/// Unified error type for the liquidity monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration validation error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Info endpoint error.
    #[error("info error: {0}")]
    Info(#[from] InfoError),
}

/// Streaming connection and frame errors.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed by the peer.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Inbound frame did not match the expected envelope.
    #[error("failed to parse websocket frame: {0}")]
    ParseError(String),

    /// Outbound frame could not be written.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Info endpoint (request/response) errors.
#[derive(Error, Debug)]
pub enum InfoError {
    /// HTTP request failed.
    #[error("info request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("info endpoint returned HTTP {status} for {request}")]
    Status {
        /// Request type that failed.
        request: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// Response body did not have the expected shape.
    #[error("failed to decode {request} response: {reason}")]
    Decode {
        /// Request type being decoded.
        request: &'static str,
        /// Reason for failure.
        reason: String,
    },

    /// Coin is not listed in the exchange universe.
    #[error("coin {0} not found in universe")]
    UnknownCoin(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, MonitorError>;
