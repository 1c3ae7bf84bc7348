//! Liquidity analytics over normalized order-book snapshots.
//!
//! All functions here are pure; they read a snapshot and never mutate it.

pub mod depth;
pub mod format;
pub mod slippage;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orderbook::OrderbookSnapshot;

pub use depth::{compute_depth, compute_depth_at, DepthMetric, DEPTH_DISTANCES_BPS};
pub use format::{format_bps, format_percent, format_usd};
pub use slippage::{
    estimate_slippage, estimate_slippage_at, walk_book, FillInfo, SlippageMetric,
    SLIPPAGE_NOTIONALS_USD,
};

/// Depth and slippage for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityReport {
    /// Coin symbol.
    pub coin: String,
    /// Snapshot timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// Mid price.
    pub mid_price: Decimal,
    /// Best ask minus best bid.
    pub spread: Decimal,
    /// Spread in bps of mid.
    pub spread_bps: Decimal,
    /// Depth per distance; empty unless the book is two-sided with a positive mid.
    pub depth: Vec<DepthMetric>,
    /// Slippage per notional; empty under the same condition.
    pub slippage: Vec<SlippageMetric>,
}

impl LiquidityReport {
    /// Compute the report for `snapshot`.
    pub fn from_snapshot(snapshot: &OrderbookSnapshot) -> Self {
        let computable = snapshot.is_two_sided() && snapshot.mid_price > Decimal::ZERO;
        let (depth, slippage) = if computable {
            (
                compute_depth(&snapshot.bids, &snapshot.asks, snapshot.mid_price),
                estimate_slippage(&snapshot.bids, &snapshot.asks, snapshot.mid_price),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        Self {
            coin: snapshot.coin.clone(),
            timestamp: snapshot.timestamp,
            mid_price: snapshot.mid_price,
            spread: snapshot.spread,
            spread_bps: snapshot.spread_bps(),
            depth,
            slippage,
        }
    }

    /// Whether depth and slippage rows are present.
    pub fn is_available(&self) -> bool {
        !self.depth.is_empty()
    }
}
