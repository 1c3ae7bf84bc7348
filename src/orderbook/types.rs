//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Anything with a price and a size.
pub trait BookLevel {
    /// Price at this level.
    fn price(&self) -> Decimal;
    /// Size at this level in base units.
    fn size(&self) -> Decimal;

    /// USD notional resting at this level, saturating at `Decimal::MAX`.
    fn notional(&self) -> Decimal {
        self.price().saturating_mul(self.size())
    }
}

/// Single raw price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

impl BookLevel for PriceLevel {
    fn price(&self) -> Decimal {
        self.price
    }

    fn size(&self) -> Decimal {
        self.size
    }
}

/// Normalized level with a running size total from the best price outward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepthLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Size at this level.
    pub size: Decimal,
    /// Sum of sizes from the best level through this one.
    pub cumulative_size: Decimal,
}

impl BookLevel for DepthLevel {
    fn price(&self) -> Decimal {
        self.price
    }

    fn size(&self) -> Decimal {
        self.size
    }
}

/// Normalized two-sided book.
///
/// Bids are best-first (descending price), asks best-first (ascending).
/// `spread` and `mid_price` are zero when either side is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderbookSnapshot {
    /// Coin symbol.
    pub coin: String,
    /// Bid levels.
    pub bids: Vec<DepthLevel>,
    /// Ask levels.
    pub asks: Vec<DepthLevel>,
    /// Best ask minus best bid.
    pub spread: Decimal,
    /// Mean of best bid and best ask.
    pub mid_price: Decimal,
    /// Exchange timestamp in epoch milliseconds.
    pub timestamp: i64,
}

impl OrderbookSnapshot {
    /// Empty snapshot for `coin`.
    pub fn empty(coin: impl Into<String>) -> Self {
        Self {
            coin: coin.into(),
            ..Self::default()
        }
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Whether both sides carry at least one level.
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    /// Check if the book is crossed (best ask below best bid).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }

    /// Spread in basis points of mid, zero if mid is zero.
    pub fn spread_bps(&self) -> Decimal {
        self.spread
            .checked_div(self.mid_price)
            .map_or(Decimal::ZERO, |ratio| ratio.saturating_mul(Decimal::from(10_000)))
    }

    /// Total size on the bid side.
    pub fn total_bid_size(&self) -> Decimal {
        self.bids.last().map(|l| l.cumulative_size).unwrap_or(Decimal::ZERO)
    }

    /// Total size on the ask side.
    pub fn total_ask_size(&self) -> Decimal {
        self.asks.last().map(|l| l.cumulative_size).unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, size: Decimal, cumulative_size: Decimal) -> DepthLevel {
        DepthLevel {
            price,
            size,
            cumulative_size,
        }
    }

    #[test]
    fn notional_is_price_times_size() {
        assert_eq!(PriceLevel::new(dec!(101), dec!(2)).notional(), dec!(202));
        assert_eq!(level(dec!(99), dec!(2), dec!(3)).notional(), dec!(198));
    }

    #[test]
    fn snapshot_best_prices_and_totals() {
        let book = OrderbookSnapshot {
            coin: "BTC".to_string(),
            bids: vec![level(dec!(100), dec!(1), dec!(1)), level(dec!(99), dec!(2), dec!(3))],
            asks: vec![level(dec!(101), dec!(1), dec!(1))],
            spread: dec!(1),
            mid_price: dec!(100.5),
            timestamp: 0,
        };

        assert_eq!(book.best_bid(), Some(dec!(100)));
        assert_eq!(book.best_ask(), Some(dec!(101)));
        assert_eq!(book.total_bid_size(), dec!(3));
        assert_eq!(book.total_ask_size(), dec!(1));
        assert!(book.is_two_sided());
        assert!(!book.is_inverted());
        assert_eq!(book.spread_bps().round_dp(4), dec!(99.5025));
    }

    #[test]
    fn empty_snapshot_has_zero_metrics() {
        let book = OrderbookSnapshot::empty("ETH");
        assert_eq!(book.coin, "ETH");
        assert!(!book.is_two_sided());
        assert_eq!(book.spread_bps(), Decimal::ZERO);
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let value = serde_json::to_value(OrderbookSnapshot::empty("BTC")).unwrap();
        assert!(value.get("midPrice").is_some());
        assert!(value.get("spread").is_some());
    }
}
