//! Display helpers for liquidity figures.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

fn fixed(value: Decimal, places: u32) -> String {
    let rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", places as usize, rounded)
}

/// `$1.235B`, `$12.50M`, `$3.20K` or `$999.99`.
pub fn format_usd(value: Decimal) -> String {
    if value >= dec!(1_000_000_000) {
        format!("${}B", fixed(value / dec!(1_000_000_000), 3))
    } else if value >= dec!(1_000_000) {
        format!("${}M", fixed(value / dec!(1_000_000), 2))
    } else if value >= dec!(1_000) {
        format!("${}K", fixed(value / dec!(1_000), 2))
    } else {
        format!("${}", fixed(value, 2))
    }
}

/// Basis points with an explicit sign, e.g. `+12.50`.
pub fn format_bps(bps: Decimal) -> String {
    let sign = if bps >= Decimal::ZERO { "+" } else { "" };
    format!("{sign}{}", fixed(bps, 2))
}

/// Ratio as a percentage with four decimals, e.g. `0.0125%`.
pub fn format_percent(ratio: Decimal) -> String {
    format!("{}%", fixed(ratio.saturating_mul(dec!(100)), 4))
}
