//! Bounded, time-ordered candle series with a parallel volume series.

use serde::Serialize;

use super::types::{Candle, VolumeBar};

/// Maximum number of candles retained per series.
pub const MAX_CANDLES: usize = 500;

/// Outcome of a live upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// An existing bucket was replaced in place.
    Replaced,
    /// A new bucket was inserted.
    Inserted,
    /// A new bucket was inserted and the oldest ones evicted.
    InsertedEvicting(usize),
}

/// Candles ordered by strictly increasing `time`, capped at a fixed capacity.
///
/// The volume series is kept index-aligned with the candles: `volumes[i]`
/// always describes `candles[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
    volumes: Vec<VolumeBar>,
    #[serde(skip)]
    capacity: usize,
}

impl Default for CandleSeries {
    fn default() -> Self {
        Self::with_capacity(MAX_CANDLES)
    }
}

impl CandleSeries {
    /// Create an empty series with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            candles: Vec::new(),
            volumes: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Build a series from a historical seed.
    ///
    /// The seed is sorted by time, duplicate buckets keep the last entry and
    /// only the most recent `capacity` buckets are retained.
    pub fn from_seed(mut seed: Vec<Candle>, capacity: usize) -> Self {
        seed.sort_by_key(|c| c.time);

        let mut candles: Vec<Candle> = Vec::with_capacity(seed.len());
        for candle in seed {
            match candles.last_mut() {
                Some(last) if last.time == candle.time => *last = candle,
                _ => candles.push(candle),
            }
        }

        let mut series = Self::with_capacity(capacity);
        let excess = candles.len().saturating_sub(series.capacity);
        candles.drain(..excess);
        series.volumes = candles.iter().map(VolumeBar::from).collect();
        series.candles = candles;
        series
    }

    /// Insert or replace the bucket at `candle.time`.
    pub fn upsert(&mut self, candle: Candle) -> Upsert {
        match self.candles.binary_search_by_key(&candle.time, |c| c.time) {
            Ok(index) => {
                self.candles[index] = candle;
                self.volumes[index] = VolumeBar::from(&candle);
                Upsert::Replaced
            }
            Err(index) => {
                self.candles.insert(index, candle);
                self.volumes.insert(index, VolumeBar::from(&candle));

                let excess = self.candles.len().saturating_sub(self.capacity);
                if excess == 0 {
                    return Upsert::Inserted;
                }
                self.candles.drain(..excess);
                self.volumes.drain(..excess);
                Upsert::InsertedEvicting(excess)
            }
        }
    }

    /// Drop every bucket.
    pub fn clear(&mut self) {
        self.candles.clear();
        self.volumes.clear();
    }

    /// Candles, oldest first.
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Volume bars, index-aligned with [`Self::candles`].
    pub fn volumes(&self) -> &[VolumeBar] {
        &self.volumes
    }

    /// Most recent candle.
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Number of buckets held.
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Whether the series holds no buckets.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Maximum number of buckets retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
