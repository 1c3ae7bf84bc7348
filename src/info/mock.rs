//! Mock info source for testing.
//!
//! Serves canned candles and funding snapshots without making network
//! requests, with switchable failures and per-coin latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::types::{CandleSnapshotRequest, FundingSnapshot};
use super::MarketDataSource;
use crate::candles::{Candle, CandleInterval};
use crate::error::InfoError;

/// Configuration for mock source behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Whether to fail candle snapshot requests.
    pub fail_candles: bool,
    /// Whether to fail funding requests.
    pub fail_funding: bool,
    /// Simulated latency applied to every request.
    pub latency: Duration,
}

/// Mock implementation of [`MarketDataSource`].
#[derive(Debug, Default)]
pub struct MockInfoClient {
    fail_candles: AtomicBool,
    fail_funding: AtomicBool,
    latency: Duration,
    coin_latency: Mutex<HashMap<String, Duration>>,
    candles: Mutex<HashMap<(String, CandleInterval), Vec<Candle>>>,
    funding: Mutex<HashMap<String, FundingSnapshot>>,
    candle_requests: Mutex<Vec<CandleSnapshotRequest>>,
    funding_calls: AtomicUsize,
}

impl MockInfoClient {
    /// Create a mock with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            fail_candles: AtomicBool::new(config.fail_candles),
            fail_funding: AtomicBool::new(config.fail_funding),
            latency: config.latency,
            ..Self::default()
        }
    }

    /// Candles returned for `coin` at `interval`.
    pub fn set_candles(&self, coin: &str, interval: CandleInterval, candles: Vec<Candle>) {
        self.candles.lock().insert((coin.to_string(), interval), candles);
    }

    /// Funding snapshot returned for its coin.
    pub fn set_funding(&self, snapshot: FundingSnapshot) {
        self.funding.lock().insert(snapshot.coin.clone(), snapshot);
    }

    /// Extra latency for requests about `coin`.
    pub fn set_coin_latency(&self, coin: &str, latency: Duration) {
        self.coin_latency.lock().insert(coin.to_string(), latency);
    }

    /// Toggle candle request failures.
    pub fn set_fail_candles(&self, fail: bool) {
        self.fail_candles.store(fail, Ordering::SeqCst);
    }

    /// Toggle funding request failures.
    pub fn set_fail_funding(&self, fail: bool) {
        self.fail_funding.store(fail, Ordering::SeqCst);
    }

    /// Candle requests received so far.
    pub fn candle_requests(&self) -> Vec<CandleSnapshotRequest> {
        self.candle_requests.lock().clone()
    }

    /// Number of funding requests received so far.
    pub fn funding_calls(&self) -> usize {
        self.funding_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self, coin: &str) {
        let extra = self.coin_latency.lock().get(coin).copied().unwrap_or_default();
        let total = self.latency + extra;
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }
}

impl MarketDataSource for MockInfoClient {
    fn candle_snapshot(
        &self,
        request: CandleSnapshotRequest,
    ) -> BoxFuture<'_, Result<Vec<Candle>, InfoError>> {
        Box::pin(async move {
            self.candle_requests.lock().push(request.clone());
            self.simulate_latency(&request.coin).await;

            if self.fail_candles.load(Ordering::SeqCst) {
                return Err(InfoError::Status {
                    request: "candleSnapshot",
                    status: 500,
                });
            }

            Ok(self
                .candles
                .lock()
                .get(&(request.coin.clone(), request.interval))
                .map(|candles| {
                    candles
                        .iter()
                        .filter(|c| c.time >= request.start_time && c.time <= request.end_time)
                        .copied()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn funding(&self, coin: String) -> BoxFuture<'_, Result<FundingSnapshot, InfoError>> {
        Box::pin(async move {
            self.funding_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(&coin).await;

            if self.fail_funding.load(Ordering::SeqCst) {
                return Err(InfoError::Status {
                    request: "metaAndAssetCtxs",
                    status: 500,
                });
            }

            self.funding
                .lock()
                .get(&coin)
                .cloned()
                .ok_or(InfoError::UnknownCoin(coin))
        })
    }
}
