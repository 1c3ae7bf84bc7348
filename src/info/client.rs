//! Hyperliquid info endpoint client.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::types::{funding_for, CandleSnapshotRequest, FundingSnapshot, InfoRequest, MetaAndAssetCtxs};
use super::MarketDataSource;
use crate::candles::Candle;
use crate::config::Config;
use crate::error::InfoError;
use crate::feed::messages::WsCandle;
use crate::metrics;

/// Request/response client for the info endpoint.
#[derive(Debug, Clone)]
pub struct InfoClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Info endpoint URL.
    info_url: String,
}

impl InfoClient {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, InfoError> {
        Self::with_timeout(
            config.hyperliquid_info_url.clone(),
            Duration::from_millis(config.http_timeout_ms),
        )
    }

    /// Create a client for `info_url` with a request timeout.
    pub fn with_timeout(info_url: impl Into<String>, timeout: Duration) -> Result<Self, InfoError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            info_url: info_url.into(),
        })
    }

    /// Info endpoint URL.
    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    async fn post<T: DeserializeOwned>(&self, request: &InfoRequest) -> Result<T, InfoError> {
        let name = request.name();
        let started = Instant::now();

        let response = self.http.post(&self.info_url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            metrics::inc_info_failures(name);
            return Err(InfoError::Status {
                request: name,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        metrics::record_info_latency(name, started.elapsed());
        debug!(request = name, bytes = body.len(), "Info response received");

        serde_json::from_slice(&body).map_err(|e| {
            metrics::inc_info_failures(name);
            InfoError::Decode {
                request: name,
                reason: e.to_string(),
            }
        })
    }

    /// Fetch historical candles for a window.
    #[instrument(skip(self), fields(coin = %request.coin, interval = %request.interval))]
    pub async fn fetch_candle_snapshot(
        &self,
        request: CandleSnapshotRequest,
    ) -> Result<Vec<Candle>, InfoError> {
        let raw: Vec<WsCandle> = self.post(&InfoRequest::CandleSnapshot { req: request }).await?;
        debug!(count = raw.len(), "Candle snapshot fetched");
        Ok(raw.iter().map(Candle::from).collect())
    }

    /// Fetch funding and open interest for `coin`.
    #[instrument(skip(self))]
    pub async fn fetch_funding(&self, coin: &str) -> Result<FundingSnapshot, InfoError> {
        let response: MetaAndAssetCtxs = self.post(&InfoRequest::MetaAndAssetCtxs).await?;
        funding_for(coin, &response)
    }
}

impl MarketDataSource for InfoClient {
    fn candle_snapshot(
        &self,
        request: CandleSnapshotRequest,
    ) -> BoxFuture<'_, Result<Vec<Candle>, InfoError>> {
        Box::pin(self.fetch_candle_snapshot(request))
    }

    fn funding(&self, coin: String) -> BoxFuture<'_, Result<FundingSnapshot, InfoError>> {
        Box::pin(async move { self.fetch_funding(&coin).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_from_default_config() {
        let client = InfoClient::new(&Config::default()).unwrap();
        assert_eq!(client.info_url(), "https://api.hyperliquid.xyz/info");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_request_error() {
        let client =
            InfoClient::with_timeout("http://127.0.0.1:9/info", Duration::from_millis(500)).unwrap();
        let result = client.fetch_funding("BTC").await;
        assert!(matches!(result, Err(InfoError::Request(_))));
    }
}
