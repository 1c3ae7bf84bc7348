//! Info endpoint request and response types.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::candles::{CandleInterval, SeriesKey};
use crate::error::InfoError;

/// Body of a `candleSnapshot` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleSnapshotRequest {
    /// Coin symbol.
    pub coin: String,
    /// Candle interval.
    pub interval: CandleInterval,
    /// Window start in epoch milliseconds.
    pub start_time: i64,
    /// Window end in epoch milliseconds.
    pub end_time: i64,
}

impl CandleSnapshotRequest {
    /// Window of length `lookback` ending at `end_time`.
    pub fn ending_at(key: &SeriesKey, end_time: i64, lookback: Duration) -> Self {
        let lookback_ms = i64::try_from(lookback.as_millis()).unwrap_or(i64::MAX);
        Self {
            coin: key.coin.clone(),
            interval: key.interval,
            start_time: end_time.saturating_sub(lookback_ms),
            end_time,
        }
    }
}

/// POST body for the info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InfoRequest {
    /// Historical candles.
    CandleSnapshot {
        /// Request parameters.
        req: CandleSnapshotRequest,
    },
    /// Universe metadata with per-asset contexts.
    MetaAndAssetCtxs,
}

impl InfoRequest {
    /// Request type name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CandleSnapshot { .. } => "candleSnapshot",
            Self::MetaAndAssetCtxs => "metaAndAssetCtxs",
        }
    }
}

/// One listed asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    /// Coin symbol.
    pub name: String,
    /// Size decimals.
    #[serde(default)]
    pub sz_decimals: u32,
}

/// Universe metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    /// Listed assets, index-aligned with the asset contexts.
    pub universe: Vec<AssetMeta>,
}

/// Per-asset market context.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    /// Current hourly funding rate.
    #[serde(with = "rust_decimal::serde::str")]
    pub funding: Decimal,
    /// Open interest in base-asset units.
    #[serde(with = "rust_decimal::serde::str")]
    pub open_interest: Decimal,
    /// Mark price.
    #[serde(with = "rust_decimal::serde::str")]
    pub mark_px: Decimal,
    /// 24h notional volume in USD.
    #[serde(with = "rust_decimal::serde::str")]
    pub day_ntl_vlm: Decimal,
    /// Oracle price.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub oracle_px: Option<Decimal>,
}

/// `metaAndAssetCtxs` response: `[meta, contexts]`.
pub type MetaAndAssetCtxs = (Meta, Vec<AssetCtx>);

/// Funding and open-interest figures for one coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingSnapshot {
    /// Coin symbol.
    pub coin: String,
    /// Current funding rate.
    pub funding_rate: Decimal,
    /// Mark price.
    pub mark_price: Decimal,
    /// Open interest valued at the mark price.
    pub open_interest_usd: Decimal,
    /// 24h notional volume.
    pub volume_24h_usd: Decimal,
}

impl FundingSnapshot {
    /// Derive the snapshot from an asset context.
    pub fn from_ctx(coin: impl Into<String>, ctx: &AssetCtx) -> Self {
        Self {
            coin: coin.into(),
            funding_rate: ctx.funding,
            mark_price: ctx.mark_px,
            open_interest_usd: ctx.open_interest.saturating_mul(ctx.mark_px),
            volume_24h_usd: ctx.day_ntl_vlm,
        }
    }
}

/// Locate `coin` in the universe and build its snapshot.
pub fn funding_for(coin: &str, response: &MetaAndAssetCtxs) -> Result<FundingSnapshot, InfoError> {
    let (meta, ctxs) = response;
    let index = meta
        .universe
        .iter()
        .position(|asset| asset.name == coin)
        .ok_or_else(|| InfoError::UnknownCoin(coin.to_string()))?;
    let ctx = ctxs.get(index).ok_or_else(|| InfoError::Decode {
        request: "metaAndAssetCtxs",
        reason: format!("no asset context at index {index} for {coin}"),
    })?;
    Ok(FundingSnapshot::from_ctx(coin, ctx))
}
