//! Hyperliquid liquidity monitor.
//!
//! Streams order-book and candle data for one selected market over a single
//! shared WebSocket, seeds candle history from the info endpoint and derives
//! liquidity metrics from every book update:
//!
//! ```text
//! depth at 10/25/50/100/200 bps from mid, per side, in USD
//! slippage for $1K/$10K/$100K market orders, per side, in bps
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`feed`]: WebSocket connection, handler fan-out and subscriptions
//! - [`orderbook`]: Book normalization and per-coin sessions
//! - [`candles`]: Candle series, seeding and live merging
//! - [`info`]: Info endpoint client and funding polling
//! - [`analytics`]: Depth, slippage and display formatting
//! - [`monitor`]: Selected-market wiring
//! - [`api`]: HTTP API for health, metrics and monitor views
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod analytics;
pub mod api;
pub mod candles;
pub mod config;
pub mod error;
pub mod feed;
pub mod info;
pub mod metrics;
pub mod monitor;
pub mod orderbook;
pub mod utils;

pub use config::Config;
pub use error::{MonitorError, Result};
