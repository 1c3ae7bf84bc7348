//! Request/response market data: historical candles and funding.
//!
//! This module handles:
//! - The [`MarketDataSource`] seam used by the aggregator and poller
//! - The reqwest-backed [`InfoClient`]
//! - A mock source for testing
//! - Periodic funding polling

pub mod client;
pub mod funding;
pub mod mock;
pub mod types;

use futures::future::BoxFuture;

use crate::candles::Candle;
use crate::error::InfoError;

pub use client::InfoClient;
pub use funding::FundingPoller;
pub use mock::{MockConfig, MockInfoClient};
pub use types::{CandleSnapshotRequest, FundingSnapshot};

/// Opaque async source of historical candles and funding figures.
pub trait MarketDataSource: Send + Sync + 'static {
    /// Candles for the requested window, oldest first.
    fn candle_snapshot(
        &self,
        request: CandleSnapshotRequest,
    ) -> BoxFuture<'_, Result<Vec<Candle>, InfoError>>;

    /// Funding and open interest for `coin`.
    fn funding(&self, coin: String) -> BoxFuture<'_, Result<FundingSnapshot, InfoError>>;
}
