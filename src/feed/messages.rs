//! Wire types for the streaming feed.
//!
//! Control messages are serialized from typed [`Subscription`]s. Inbound
//! frames are decoded once into [`InboundMessage`]; decimal strings become
//! [`Decimal`] here and are never re-parsed downstream.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candles::{CandleInterval, Candle};
use crate::error::FeedError;
use crate::orderbook::PriceLevel;

/// Channel name for order-book snapshots.
pub const CHANNEL_L2_BOOK: &str = "l2Book";
/// Channel name for candle updates.
pub const CHANNEL_CANDLE: &str = "candle";

/// One logical feed: a channel plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Subscription {
    /// Order book for a coin.
    #[serde(rename = "l2Book")]
    L2Book {
        /// Coin symbol.
        coin: String,
    },
    /// Candles for a coin at an interval.
    #[serde(rename = "candle")]
    Candle {
        /// Coin symbol.
        coin: String,
        /// Candle interval.
        interval: CandleInterval,
    },
}

impl Subscription {
    /// Order-book subscription for `coin`.
    pub fn l2_book(coin: impl Into<String>) -> Self {
        Self::L2Book { coin: coin.into() }
    }

    /// Candle subscription for `coin` at `interval`.
    pub fn candle(coin: impl Into<String>, interval: CandleInterval) -> Self {
        Self::Candle {
            coin: coin.into(),
            interval,
        }
    }

    /// Channel name of this subscription.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::L2Book { .. } => CHANNEL_L2_BOOK,
            Self::Candle { .. } => CHANNEL_CANDLE,
        }
    }
}

/// Control method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Start a feed.
    Subscribe,
    /// Stop a feed.
    Unsubscribe,
    /// Keep-alive.
    Ping,
}

/// Outbound control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    /// Control method.
    pub method: Method,
    /// Target feed, absent for pings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

impl ControlMessage {
    /// Subscribe to `subscription`.
    pub fn subscribe(subscription: Subscription) -> Self {
        Self {
            method: Method::Subscribe,
            subscription: Some(subscription),
        }
    }

    /// Unsubscribe from `subscription`.
    pub fn unsubscribe(subscription: Subscription) -> Self {
        Self {
            method: Method::Unsubscribe,
            subscription: Some(subscription),
        }
    }

    /// Application-level ping.
    pub fn ping() -> Self {
        Self {
            method: Method::Ping,
            subscription: None,
        }
    }

    /// Serialize to the JSON text frame payload.
    pub fn to_json(&self) -> Result<String, FeedError> {
        serde_json::to_string(self).map_err(|e| FeedError::SendFailed(e.to_string()))
    }
}

/// Raw inbound envelope.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    data: Value,
}

/// Price level as sent by the exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct WsLevel {
    /// Price.
    #[serde(with = "rust_decimal::serde::str")]
    pub px: Decimal,
    /// Size.
    #[serde(with = "rust_decimal::serde::str")]
    pub sz: Decimal,
    /// Number of orders at this level.
    #[serde(default)]
    pub n: u64,
}

/// `l2Book` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WsBook {
    /// Coin symbol.
    pub coin: String,
    /// `[bids, asks]`, each best-first.
    pub levels: (Vec<WsLevel>, Vec<WsLevel>),
    /// Exchange timestamp in epoch milliseconds.
    pub time: i64,
}

/// Candle record shared by the `candle` channel and the snapshot endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WsCandle {
    /// Bucket open time (ms).
    pub t: i64,
    /// Bucket close time (ms).
    #[serde(rename = "T")]
    pub close_time: i64,
    /// Coin symbol.
    pub s: String,
    /// Interval.
    pub i: String,
    /// Open price.
    #[serde(with = "rust_decimal::serde::str")]
    pub o: Decimal,
    /// High price.
    #[serde(with = "rust_decimal::serde::str")]
    pub h: Decimal,
    /// Low price.
    #[serde(with = "rust_decimal::serde::str")]
    pub l: Decimal,
    /// Close price.
    #[serde(with = "rust_decimal::serde::str")]
    pub c: Decimal,
    /// Volume.
    #[serde(with = "rust_decimal::serde::str")]
    pub v: Decimal,
    /// Trade count.
    #[serde(default)]
    pub n: u64,
}

impl From<&WsCandle> for Candle {
    fn from(raw: &WsCandle) -> Self {
        Self {
            time: raw.t,
            open: raw.o,
            high: raw.h,
            low: raw.l,
            close: raw.c,
            volume: raw.v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Decoded order-book update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUpdate {
    /// Coin symbol.
    pub coin: String,
    /// Bid levels, best-first as received.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best-first as received.
    pub asks: Vec<PriceLevel>,
    /// Exchange timestamp in epoch milliseconds.
    pub time: i64,
}

impl From<WsBook> for BookUpdate {
    fn from(book: WsBook) -> Self {
        let side = |levels: Vec<WsLevel>| -> Vec<PriceLevel> {
            levels
                .into_iter()
                .map(|level| PriceLevel::new(level.px, level.sz))
                .collect()
        };
        let (bids, asks) = book.levels;
        Self {
            coin: book.coin,
            bids: side(bids),
            asks: side(asks),
            time: book.time,
        }
    }
}

/// Decoded candle update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleUpdate {
    /// Coin symbol.
    pub coin: String,
    /// Interval as sent on the wire.
    pub interval: String,
    /// The candle.
    pub candle: Candle,
}

impl From<&WsCandle> for CandleUpdate {
    fn from(raw: &WsCandle) -> Self {
        Self {
            coin: raw.s.clone(),
            interval: raw.i.clone(),
            candle: Candle::from(raw),
        }
    }
}

/// A successfully decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `l2Book` channel.
    L2Book(BookUpdate),
    /// `candle` channel, one or more records.
    Candles(Vec<CandleUpdate>),
    /// Any other channel (subscription acks, pong, errors).
    Other {
        /// Channel name.
        channel: String,
        /// Raw payload.
        data: Value,
    },
}

impl InboundMessage {
    /// Channel this message arrived on.
    pub fn channel(&self) -> &str {
        match self {
            Self::L2Book(_) => CHANNEL_L2_BOOK,
            Self::Candles(_) => CHANNEL_CANDLE,
            Self::Other { channel, .. } => channel,
        }
    }
}

/// Decode a text frame into an [`InboundMessage`].
pub fn decode_frame(text: &str) -> Result<InboundMessage, FeedError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| FeedError::ParseError(e.to_string()))?;

    match envelope.channel.as_str() {
        CHANNEL_L2_BOOK => {
            let book: WsBook = serde_json::from_value(envelope.data)
                .map_err(|e| FeedError::ParseError(format!("l2Book payload: {e}")))?;
            Ok(InboundMessage::L2Book(book.into()))
        }
        CHANNEL_CANDLE => {
            let raw: OneOrMany<WsCandle> = serde_json::from_value(envelope.data)
                .map_err(|e| FeedError::ParseError(format!("candle payload: {e}")))?;
            let raw: Vec<WsCandle> = raw.into();
            Ok(InboundMessage::Candles(raw.iter().map(CandleUpdate::from).collect()))
        }
        _ => Ok(InboundMessage::Other {
            channel: envelope.channel,
            data: envelope.data,
        }),
    }
}
