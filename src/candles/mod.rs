//! Candle module.
//!
//! This module handles:
//! - Candle, volume and interval types
//! - The bounded upsert series
//! - Seeding and live aggregation for the selected market

pub mod aggregator;
pub mod series;
pub mod types;

pub use aggregator::{CandleAggregator, CandleView, LoadState, SeedOutcome};
pub use series::{CandleSeries, Upsert, MAX_CANDLES};
pub use types::{BarDirection, Candle, CandleInterval, SeriesKey, VolumeBar};
