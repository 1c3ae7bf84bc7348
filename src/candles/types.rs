//! Candle and volume series types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Candle intervals supported by the exchange.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    Default,
)]
pub enum CandleInterval {
    /// One minute.
    #[serde(rename = "1m")]
    #[strum(serialize = "1m")]
    M1,
    /// Three minutes.
    #[serde(rename = "3m")]
    #[strum(serialize = "3m")]
    M3,
    /// Five minutes.
    #[serde(rename = "5m")]
    #[strum(serialize = "5m")]
    M5,
    /// Fifteen minutes.
    #[serde(rename = "15m")]
    #[strum(serialize = "15m")]
    M15,
    /// Thirty minutes.
    #[serde(rename = "30m")]
    #[strum(serialize = "30m")]
    M30,
    /// One hour.
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    #[default]
    H1,
    /// Two hours.
    #[serde(rename = "2h")]
    #[strum(serialize = "2h")]
    H2,
    /// Four hours.
    #[serde(rename = "4h")]
    #[strum(serialize = "4h")]
    H4,
    /// Eight hours.
    #[serde(rename = "8h")]
    #[strum(serialize = "8h")]
    H8,
    /// Twelve hours.
    #[serde(rename = "12h")]
    #[strum(serialize = "12h")]
    H12,
    /// One day.
    #[serde(rename = "1d")]
    #[strum(serialize = "1d")]
    D1,
    /// Three days.
    #[serde(rename = "3d")]
    #[strum(serialize = "3d")]
    D3,
    /// One week.
    #[serde(rename = "1w")]
    #[strum(serialize = "1w")]
    W1,
    /// One month.
    #[serde(rename = "1M")]
    #[strum(serialize = "1M")]
    Mo1,
}

impl CandleInterval {
    /// Wire representation (e.g. "1h").
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }
}

/// Identifies one candle series: a coin at an interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SeriesKey {
    /// Coin symbol.
    pub coin: String,
    /// Candle interval.
    pub interval: CandleInterval,
}

impl SeriesKey {
    /// Create a new series key.
    pub fn new(coin: impl Into<String>, interval: CandleInterval) -> Self {
        Self {
            coin: coin.into(),
            interval,
        }
    }

    /// Whether a wire candle for `coin`/`interval` belongs to this series.
    pub fn matches(&self, coin: &str, interval: &str) -> bool {
        self.coin == coin && self.interval.as_str() == interval
    }
}

/// One OHLCV bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start in epoch milliseconds.
    pub time: i64,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume in base units.
    pub volume: Decimal,
}

impl Candle {
    /// Direction of the bucket.
    pub fn direction(&self) -> BarDirection {
        if self.close >= self.open {
            BarDirection::Up
        } else {
            BarDirection::Down
        }
    }
}

/// Whether a bucket closed at or above its open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BarDirection {
    /// close >= open.
    Up,
    /// close < open.
    Down,
}

/// Volume of one bucket, kept parallel to the candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBar {
    /// Bucket start in epoch milliseconds.
    pub time: i64,
    /// Traded volume.
    pub value: Decimal,
    /// Bucket direction.
    pub direction: BarDirection,
}

impl From<&Candle> for VolumeBar {
    fn from(candle: &Candle) -> Self {
        Self {
            time: candle.time,
            value: candle.volume,
            direction: candle.direction(),
        }
    }
}
