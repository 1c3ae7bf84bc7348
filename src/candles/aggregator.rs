//! Candle series for the selected market: historical seed plus live upserts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use strum::Display;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::series::{CandleSeries, Upsert, MAX_CANDLES};
use super::types::{Candle, SeriesKey, VolumeBar};
use crate::feed::{CandleUpdate, InboundMessage};
use crate::info::{CandleSnapshotRequest, MarketDataSource};
use crate::metrics;

/// Historical seed state of the current series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoadState {
    /// No market selected.
    Idle,
    /// Seed requested, not yet applied.
    Loading,
    /// Seed applied.
    Ready,
    /// Seed request failed; live updates still apply.
    Failed,
}

/// What happened to a seed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Seed replaced the series with this many candles.
    Loaded(usize),
    /// Selection changed while the request was in flight.
    Stale,
    /// Request failed.
    Failed,
}

/// Read-only copy of the current series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleView {
    /// Selected series, if any.
    pub key: Option<SeriesKey>,
    /// Seed state.
    pub load_state: LoadState,
    /// Candles, oldest first.
    pub candles: Vec<Candle>,
    /// Volume bars aligned with `candles`.
    pub volumes: Vec<VolumeBar>,
}

#[derive(Debug)]
struct AggregatorState {
    key: Option<SeriesKey>,
    generation: u64,
    series: CandleSeries,
    load_state: LoadState,
}

/// Maintains one bounded series for the currently selected coin and interval.
pub struct CandleAggregator {
    source: Arc<dyn MarketDataSource>,
    lookback: Duration,
    capacity: usize,
    state: Mutex<AggregatorState>,
}

impl CandleAggregator {
    /// Create an aggregator seeding from `source` over `lookback`.
    pub fn new(source: Arc<dyn MarketDataSource>, lookback: Duration) -> Self {
        Self::with_capacity(source, lookback, MAX_CANDLES)
    }

    /// Create an aggregator with a custom series capacity.
    pub fn with_capacity(
        source: Arc<dyn MarketDataSource>,
        lookback: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            source,
            lookback,
            capacity,
            state: Mutex::new(AggregatorState {
                key: None,
                generation: 0,
                series: CandleSeries::with_capacity(capacity),
                load_state: LoadState::Idle,
            }),
        }
    }

    /// Switch to `key`, discarding the current series.
    ///
    /// Returns the selection generation to pass to [`load_seed`](Self::load_seed).
    pub fn select(&self, key: SeriesKey) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        info!(coin = %key.coin, interval = %key.interval, generation = state.generation, "Candle series selected");
        state.key = Some(key);
        state.series = CandleSeries::with_capacity(self.capacity);
        state.load_state = LoadState::Loading;
        state.generation
    }

    /// Fetch the historical seed for selection `generation`, ending at `end_ms`.
    pub async fn load_seed(&self, generation: u64, end_ms: i64) -> SeedOutcome {
        let key = {
            let state = self.state.lock();
            match (&state.key, state.generation == generation) {
                (Some(key), true) => key.clone(),
                _ => return SeedOutcome::Stale,
            }
        };

        let request = CandleSnapshotRequest::ending_at(&key, end_ms, self.lookback);
        let started = Instant::now();
        let result = self.source.candle_snapshot(request).await;
        metrics::record_seed_latency(started.elapsed());

        let mut state = self.state.lock();
        if state.generation != generation {
            metrics::inc_seed_discarded();
            debug!(coin = %key.coin, interval = %key.interval, "Discarding stale candle seed");
            return SeedOutcome::Stale;
        }

        match result {
            Ok(candles) => {
                state.series = CandleSeries::from_seed(candles, self.capacity);
                state.load_state = LoadState::Ready;
                info!(coin = %key.coin, interval = %key.interval, candles = state.series.len(), "Candle seed loaded");
                SeedOutcome::Loaded(state.series.len())
            }
            Err(e) => {
                state.load_state = LoadState::Failed;
                warn!(coin = %key.coin, interval = %key.interval, error = %e, "Candle seed failed");
                SeedOutcome::Failed
            }
        }
    }

    /// Select `key` and fetch its seed in the background.
    pub fn select_and_seed(self: &Arc<Self>, key: SeriesKey, end_ms: i64) -> JoinHandle<SeedOutcome> {
        let generation = self.select(key);
        let aggregator = Arc::clone(self);
        tokio::spawn(async move { aggregator.load_seed(generation, end_ms).await })
    }

    /// Upsert every update matching the selected series. Returns how many applied.
    pub fn apply_live(&self, updates: &[CandleUpdate]) -> usize {
        let mut state = self.state.lock();
        let Some(key) = state.key.clone() else {
            return 0;
        };

        let mut applied = 0;
        for update in updates {
            if !key.matches(&update.coin, &update.interval) {
                continue;
            }
            if let Upsert::InsertedEvicting(evicted) = state.series.upsert(update.candle) {
                debug!(evicted, "Candle series at capacity");
            }
            metrics::inc_candle_upserts();
            applied += 1;
        }
        applied
    }

    /// Message handler entry point.
    pub fn handle(&self, message: &InboundMessage) -> anyhow::Result<()> {
        if let InboundMessage::Candles(updates) = message {
            self.apply_live(updates);
        }
        Ok(())
    }

    /// Copy of the current series.
    pub fn snapshot(&self) -> CandleView {
        let state = self.state.lock();
        CandleView {
            key: state.key.clone(),
            load_state: state.load_state,
            candles: state.series.candles().to_vec(),
            volumes: state.series.volumes().to_vec(),
        }
    }

    /// Selected series.
    pub fn key(&self) -> Option<SeriesKey> {
        self.state.lock().key.clone()
    }

    /// Seed state.
    pub fn load_state(&self) -> LoadState {
        self.state.lock().load_state
    }

    /// Number of candles held.
    pub fn len(&self) -> usize {
        self.state.lock().series.len()
    }

    /// Whether the series is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().series.is_empty()
    }
}

impl std::fmt::Debug for CandleAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CandleAggregator")
            .field("key", &state.key)
            .field("load_state", &state.load_state)
            .field("len", &state.series.len())
            .finish()
    }
}
