//! Resting notional within a distance of mid.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::orderbook::BookLevel;

/// Distances from mid, in basis points, at which depth is reported.
pub const DEPTH_DISTANCES_BPS: [u32; 5] = [10, 25, 50, 100, 200];

/// Basis points per unit.
pub const BPS_PER_UNIT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// USD notional resting on each side within `distance_bps` of mid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthMetric {
    /// Distance from mid in basis points.
    pub distance_bps: u32,
    /// Bid notional priced in `[mid * (1 - d), mid]`.
    pub bid_depth_usd: Decimal,
    /// Ask notional priced in `[mid, mid * (1 + d)]`.
    pub ask_depth_usd: Decimal,
}

/// Depth at the standard distances, in increasing distance order.
pub fn compute_depth<L: BookLevel>(bids: &[L], asks: &[L], mid_price: Decimal) -> Vec<DepthMetric> {
    compute_depth_at(bids, asks, mid_price, &DEPTH_DISTANCES_BPS)
}

/// Depth at arbitrary distances, one metric per distance in the given order.
#[instrument(skip(bids, asks), fields(bids = bids.len(), asks = asks.len(), mid = %mid_price))]
pub fn compute_depth_at<L: BookLevel>(
    bids: &[L],
    asks: &[L],
    mid_price: Decimal,
    distances_bps: &[u32],
) -> Vec<DepthMetric> {
    distances_bps
        .iter()
        .map(|&distance_bps| {
            let fraction = Decimal::from(distance_bps) / BPS_PER_UNIT;
            let bid_lower = mid_price.saturating_mul(Decimal::ONE - fraction);
            let ask_upper = mid_price.saturating_mul(Decimal::ONE + fraction);

            let bid_depth_usd = bids
                .iter()
                .filter(|l| l.price() >= bid_lower && l.price() <= mid_price)
                .map(BookLevel::notional)
                .fold(Decimal::ZERO, Decimal::saturating_add);
            let ask_depth_usd = asks
                .iter()
                .filter(|l| l.price() >= mid_price && l.price() <= ask_upper)
                .map(BookLevel::notional)
                .fold(Decimal::ZERO, Decimal::saturating_add);

            DepthMetric {
                distance_bps,
                bid_depth_usd,
                ask_depth_usd,
            }
        })
        .collect()
}
