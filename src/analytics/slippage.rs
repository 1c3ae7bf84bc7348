//! Market-order slippage by walking the book.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::depth::BPS_PER_UNIT;
use crate::orderbook::BookLevel;

/// Order notionals, in USD, for which slippage is reported.
pub const SLIPPAGE_NOTIONALS_USD: [u64; 3] = [1_000, 10_000, 100_000];

/// Slippage of simulated market orders of one notional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlippageMetric {
    /// Order notional in USD.
    pub notional_usd: u64,
    /// Buy (ask-consuming) slippage in bps, never negative.
    pub buy_slippage_bps: Decimal,
    /// Sell (bid-consuming) slippage in bps, never negative.
    pub sell_slippage_bps: Decimal,
}

/// Result of consuming a notional from one side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillInfo {
    /// USD actually filled.
    pub filled_notional: Decimal,
    /// Base-asset size acquired.
    pub filled_size: Decimal,
    /// Levels touched.
    pub levels_consumed: usize,
    /// Whether the side ran out before the notional was filled.
    pub exhausted: bool,
}

impl FillInfo {
    /// Volume-weighted average fill price, `None` if nothing filled or the
    /// quotient does not fit a `Decimal`.
    pub fn vwap(&self) -> Option<Decimal> {
        if self.filled_size.is_zero() {
            None
        } else {
            self.filled_notional.checked_div(self.filled_size)
        }
    }
}

/// Consume up to `notional` USD from `levels`, best first.
///
/// Levels with a non-positive price are skipped, as are levels whose size
/// in base units would overflow. Running out of book is not an error; the
/// fill reflects what was available.
pub fn walk_book<L: BookLevel>(levels: &[L], notional: Decimal) -> FillInfo {
    let mut remaining = notional;
    let mut filled_notional = Decimal::ZERO;
    let mut filled_size = Decimal::ZERO;
    let mut levels_consumed = 0;

    for level in levels {
        if remaining <= Decimal::ZERO {
            break;
        }
        let price = level.price();
        if price <= Decimal::ZERO {
            continue;
        }

        let consumed = remaining.min(level.notional());
        let Some(size) = consumed.checked_div(price) else {
            continue;
        };
        filled_notional = filled_notional.saturating_add(consumed);
        filled_size = filled_size.saturating_add(size);
        remaining -= consumed;
        levels_consumed += 1;
    }

    FillInfo {
        filled_notional,
        filled_size,
        levels_consumed,
        exhausted: remaining > Decimal::ZERO,
    }
}

/// Slippage at the standard notionals, in increasing notional order.
pub fn estimate_slippage<L: BookLevel>(
    bids: &[L],
    asks: &[L],
    mid_price: Decimal,
) -> Vec<SlippageMetric> {
    estimate_slippage_at(bids, asks, mid_price, &SLIPPAGE_NOTIONALS_USD)
}

/// Slippage at arbitrary notionals, one metric per notional in the given order.
#[instrument(skip(bids, asks), fields(bids = bids.len(), asks = asks.len(), mid = %mid_price))]
pub fn estimate_slippage_at<L: BookLevel>(
    bids: &[L],
    asks: &[L],
    mid_price: Decimal,
    notionals_usd: &[u64],
) -> Vec<SlippageMetric> {
    notionals_usd
        .iter()
        .map(|&notional_usd| {
            if mid_price <= Decimal::ZERO {
                return SlippageMetric {
                    notional_usd,
                    buy_slippage_bps: Decimal::ZERO,
                    sell_slippage_bps: Decimal::ZERO,
                };
            }
            let notional = Decimal::from(notional_usd);

            let avg_buy = walk_book(asks, notional).vwap().unwrap_or(mid_price);
            let avg_sell = walk_book(bids, notional).vwap().unwrap_or(mid_price);

            SlippageMetric {
                notional_usd,
                buy_slippage_bps: to_bps(avg_buy.saturating_sub(mid_price), mid_price),
                sell_slippage_bps: to_bps(mid_price.saturating_sub(avg_sell), mid_price),
            }
        })
        .collect()
}

fn to_bps(deviation: Decimal, mid_price: Decimal) -> Decimal {
    deviation
        .checked_div(mid_price)
        .map_or(Decimal::ZERO, |ratio| ratio.saturating_mul(BPS_PER_UNIT))
        .max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::PriceLevel;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn book() -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        (
            vec![PriceLevel::new(dec!(100), dec!(1)), PriceLevel::new(dec!(99), dec!(2))],
            vec![PriceLevel::new(dec!(101), dec!(1)), PriceLevel::new(dec!(102), dec!(2))],
        )
    }

    #[test]
    fn thousand_usd_exhausts_small_book() {
        let (bids, asks) = book();
        let slippage = estimate_slippage(&bids, &asks, dec!(100.5));

        let first = slippage[0];
        assert_eq!(first.notional_usd, 1_000);
        assert_eq!(first.buy_slippage_bps.round_dp(2), dec!(116.09));
        assert_eq!(first.sell_slippage_bps.round_dp(2), dec!(116.09));
    }

    #[test]
    fn walk_reports_partial_fill() {
        let (_, asks) = book();
        let fill = walk_book(&asks, dec!(1000));

        assert_eq!(fill.filled_notional, dec!(305));
        assert_eq!(fill.filled_size, dec!(3));
        assert_eq!(fill.levels_consumed, 2);
        assert!(fill.exhausted);
    }

    #[test]
    fn walk_splits_last_level() {
        let asks = vec![PriceLevel::new(dec!(100), dec!(1)), PriceLevel::new(dec!(200), dec!(10))];
        let fill = walk_book(&asks, dec!(500));

        // 100 USD at 100, then 400 USD at 200
        assert_eq!(fill.filled_size, dec!(3));
        assert!(!fill.exhausted);
        assert_eq!(fill.vwap().unwrap().round_dp(4), dec!(166.6667));
    }

    #[test]
    fn empty_side_means_zero_slippage() {
        let (bids, _) = book();
        let empty: Vec<PriceLevel> = Vec::new();
        let slippage = estimate_slippage(&bids, &empty, dec!(100.5));
        assert!(slippage.iter().all(|m| m.buy_slippage_bps.is_zero()));
    }

    #[test]
    fn zero_mid_means_zero_slippage() {
        let (bids, asks) = book();
        let slippage = estimate_slippage(&bids, &asks, Decimal::ZERO);
        assert!(slippage
            .iter()
            .all(|m| m.buy_slippage_bps.is_zero() && m.sell_slippage_bps.is_zero()));
    }

    #[test]
    fn favourable_fill_is_floored_at_zero() {
        // crossed book: asks below mid
        let asks = vec![PriceLevel::new(dec!(99), dec!(100))];
        let bids = vec![PriceLevel::new(dec!(102), dec!(100))];
        let slippage = estimate_slippage(&bids, &asks, dec!(100.5));
        assert_eq!(slippage[0].buy_slippage_bps, Decimal::ZERO);
        assert_eq!(slippage[0].sell_slippage_bps, Decimal::ZERO);
    }

    #[test]
    fn zero_price_levels_are_skipped() {
        let asks = vec![PriceLevel::new(Decimal::ZERO, dec!(5)), PriceLevel::new(dec!(10), dec!(5))];
        let fill = walk_book(&asks, dec!(20));
        assert_eq!(fill.filled_size, dec!(2));
        assert_eq!(fill.levels_consumed, 1);
    }

    #[test]
    fn level_too_small_to_size_is_skipped() {
        // 100k USD at 1e-28 per unit does not fit a Decimal
        let asks = vec![PriceLevel::new(Decimal::new(1, 28), Decimal::MAX)];
        let fill = walk_book(&asks, dec!(100000));

        assert_eq!(fill.levels_consumed, 0);
        assert!(fill.exhausted);
        assert_eq!(fill.vwap(), None);
    }

    /// Best-first side: prices move away from `start` by non-negative steps.
    fn arb_side(ascending: bool) -> impl Strategy<Value = Vec<PriceLevel>> {
        prop::collection::vec((0i64..200, 1i64..50_000), 0..40).prop_map(move |raw| {
            let mut price = Decimal::new(if ascending { 10_050 } else { 10_000 }, 2);
            raw.into_iter()
                .map(|(step, size)| {
                    let step = Decimal::new(step, 2);
                    price = if ascending { price + step } else { (price - step).max(dec!(1)) };
                    PriceLevel::new(price, Decimal::new(size, 3))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn slippage_is_monotone_in_notional(bids in arb_side(false), asks in arb_side(true)) {
            let notionals = [100u64, 1_000, 5_000, 10_000, 50_000, 100_000, 1_000_000];
            let slippage = estimate_slippage_at(&bids, &asks, dec!(100.25), &notionals);
            let tolerance = dec!(0.000001);
            for pair in slippage.windows(2) {
                prop_assert!(pair[0].buy_slippage_bps <= pair[1].buy_slippage_bps + tolerance);
                prop_assert!(pair[0].sell_slippage_bps <= pair[1].sell_slippage_bps + tolerance);
            }
        }
    }
}
