//! Raw level lists to cumulative-depth snapshots.

use rust_decimal::Decimal;

use super::types::{DepthLevel, OrderbookSnapshot, PriceLevel};
use crate::feed::BookUpdate;

/// Levels retained per side.
pub const MAX_LEVELS: usize = 50;

/// Take the first [`MAX_LEVELS`] levels in feed order and accumulate size.
pub fn cumulative_levels(levels: &[PriceLevel]) -> Vec<DepthLevel> {
    let mut running = Decimal::ZERO;
    levels
        .iter()
        .take(MAX_LEVELS)
        .map(|level| {
            running = running.saturating_add(level.size);
            DepthLevel {
                price: level.price,
                size: level.size,
                cumulative_size: running,
            }
        })
        .collect()
}

/// Build a snapshot from raw best-first sides.
pub fn normalize_levels(
    coin: impl Into<String>,
    bids: &[PriceLevel],
    asks: &[PriceLevel],
    timestamp: i64,
) -> OrderbookSnapshot {
    let bids = cumulative_levels(bids);
    let asks = cumulative_levels(asks);

    let (spread, mid_price) = match (bids.first(), asks.first()) {
        (Some(bid), Some(ask)) => (ask.price.saturating_sub(bid.price), midpoint(bid.price, ask.price)),
        _ => (Decimal::ZERO, Decimal::ZERO),
    };

    OrderbookSnapshot {
        coin: coin.into(),
        bids,
        asks,
        spread,
        mid_price,
        timestamp,
    }
}

fn midpoint(bid: Decimal, ask: Decimal) -> Decimal {
    match bid.checked_add(ask) {
        Some(sum) => sum / Decimal::TWO,
        None => (bid / Decimal::TWO).saturating_add(ask / Decimal::TWO),
    }
}

/// Normalize a decoded `l2Book` update.
pub fn normalize_book(update: &BookUpdate) -> OrderbookSnapshot {
    normalize_levels(update.coin.clone(), &update.bids, &update.asks, update.time)
}
