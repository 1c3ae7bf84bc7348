//! Market monitor: one selected coin and interval over the shared feed.
//!
//! The monitor wires the connection, the subscription router, a per-coin
//! order-book session, the candle aggregator and the funding poller together.
//! Switching market replaces the book session, moves both subscriptions,
//! reseeds the candle series and restarts funding polling when the coin
//! changes. The connection itself is never torn down by a switch.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analytics::LiquidityReport;
use crate::candles::{CandleAggregator, CandleInterval, CandleView, SeedOutcome, SeriesKey};
use crate::config::Config;
use crate::error::{MonitorError, Result};
use crate::feed::{
    ConnectionManager, ConnectionStatus, HandlerGuard, InboundMessage, Subscription,
    SubscriptionRouter,
};
use crate::info::{FundingPoller, FundingSnapshot, InfoClient, MarketDataSource};
use crate::orderbook::{OrderbookSession, OrderbookSnapshot};
use crate::utils::now_ms;

/// Selected coin and candle interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketSelection {
    /// Coin symbol.
    pub coin: String,
    /// Candle interval.
    pub interval: CandleInterval,
}

impl MarketSelection {
    /// Create a selection.
    pub fn new(coin: impl Into<String>, interval: CandleInterval) -> Self {
        Self {
            coin: coin.into(),
            interval,
        }
    }

    fn book_subscription(&self) -> Subscription {
        Subscription::l2_book(self.coin.clone())
    }

    fn candle_subscription(&self) -> Subscription {
        Subscription::candle(self.coin.clone(), self.interval)
    }
}

/// Tuning for a monitor.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Historical candle window.
    pub seed_lookback: Duration,
    /// Funding polling period.
    pub funding_period: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            seed_lookback: Duration::from_secs(30 * 86_400),
            funding_period: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for MonitorOptions {
    fn from(config: &Config) -> Self {
        Self {
            seed_lookback: config.seed_lookback(),
            funding_period: config.funding_poll_interval(),
        }
    }
}

struct ActiveMarket {
    selection: MarketSelection,
    book: Arc<OrderbookSession>,
    _book_handler: HandlerGuard,
    seed: Option<JoinHandle<SeedOutcome>>,
}

/// Live view of one market.
pub struct MarketMonitor {
    connection: Arc<ConnectionManager>,
    router: Arc<SubscriptionRouter>,
    candles: Arc<CandleAggregator>,
    funding: FundingPoller,
    active: Mutex<Option<ActiveMarket>>,
    observer: Mutex<Option<JoinHandle<()>>>,
    _candle_handler: HandlerGuard,
}

impl MarketMonitor {
    /// Create a monitor over `connection`, seeding and polling from `source`.
    pub fn new(
        connection: Arc<ConnectionManager>,
        source: Arc<dyn MarketDataSource>,
        options: MonitorOptions,
    ) -> Self {
        let router = Arc::new(SubscriptionRouter::new(connection.clone()));
        let candles = Arc::new(CandleAggregator::new(source.clone(), options.seed_lookback));
        let funding = FundingPoller::new(source, options.funding_period);

        let handler_candles = Arc::clone(&candles);
        let candle_handler =
            connection.subscribe(move |message: &InboundMessage| handler_candles.handle(message));

        Self {
            connection,
            router,
            candles,
            funding,
            active: Mutex::new(None),
            observer: Mutex::new(None),
            _candle_handler: candle_handler,
        }
    }

    /// Build the connection from config and create a monitor.
    pub fn from_config(config: &Config, source: Arc<dyn MarketDataSource>) -> Result<Self> {
        config.validate().map_err(MonitorError::InvalidConfig)?;
        let connection = Arc::new(ConnectionManager::with_config(
            config.hyperliquid_ws_url.clone(),
            config.reconnect_config(),
            config.heartbeat_interval(),
        ));
        Ok(Self::new(connection, source, MonitorOptions::from(config)))
    }

    /// Monitor over the configured endpoints, with a real info client.
    pub fn connect(config: &Config) -> Result<Self> {
        let source: Arc<dyn MarketDataSource> = Arc::new(InfoClient::new(config)?);
        Self::from_config(config, source)
    }

    /// Start the connection and the subscription observer.
    pub fn start(&self) {
        let mut observer = self.observer.lock();
        if observer.as_ref().map_or(true, |handle| handle.is_finished()) {
            *observer = Some(self.router.spawn_observer(self.connection.watch_status()));
        }
        self.connection.start();
    }

    /// Stop polling and close the connection.
    pub async fn shutdown(&self) {
        self.funding.stop();
        if let Some(observer) = self.observer.lock().take() {
            observer.abort();
        }
        self.connection.stop().await;
        info!("Market monitor stopped");
    }

    /// Switch to `coin` at `interval`. Returns `false` if already selected.
    pub fn select_market(&self, coin: impl Into<String>, interval: CandleInterval) -> bool {
        let selection = MarketSelection::new(coin, interval);
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|current| current.selection == selection) {
            return false;
        }

        // Register the new session before subscribing so its first book is not missed.
        let book = Arc::new(OrderbookSession::new(selection.coin.clone()));
        let handler_book = Arc::clone(&book);
        let book_handler =
            self.connection.subscribe(move |message: &InboundMessage| handler_book.handle(message));

        let previous = active.take();
        match &previous {
            Some(prev) => {
                self.router
                    .switch(&prev.selection.book_subscription(), selection.book_subscription());
                self.router.switch(
                    &prev.selection.candle_subscription(),
                    selection.candle_subscription(),
                );
            }
            None => {
                self.router.acquire(selection.book_subscription());
                self.router.acquire(selection.candle_subscription());
            }
        }

        let seed = self.candles.select_and_seed(
            SeriesKey::new(selection.coin.clone(), selection.interval),
            now_ms(),
        );

        let coin_changed = previous
            .as_ref()
            .map_or(true, |prev| prev.selection.coin != selection.coin);
        if coin_changed {
            self.funding.start(selection.coin.clone());
        }

        info!(coin = %selection.coin, interval = %selection.interval, "Market selected");
        *active = Some(ActiveMarket {
            selection,
            book,
            _book_handler: book_handler,
            seed: Some(seed),
        });
        true
    }

    /// Wait for the current selection's historical seed.
    pub async fn wait_for_seed(&self) -> Option<SeedOutcome> {
        let handle = self.active.lock().as_mut().and_then(|a| a.seed.take())?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Seed task failed");
                None
            }
        }
    }

    /// Current selection.
    pub fn selection(&self) -> Option<MarketSelection> {
        self.active.lock().as_ref().map(|a| a.selection.clone())
    }

    /// Connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Shared connection.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Subscription router.
    pub fn router(&self) -> &Arc<SubscriptionRouter> {
        &self.router
    }

    /// Latest order book of the selected coin.
    pub fn orderbook(&self) -> OrderbookSnapshot {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.book.snapshot())
            .unwrap_or_default()
    }

    /// Observe order-book replacements of the selected coin.
    pub fn watch_orderbook(&self) -> Option<watch::Receiver<OrderbookSnapshot>> {
        self.active.lock().as_ref().map(|a| a.book.watch())
    }

    /// Depth and slippage for the latest book.
    pub fn liquidity(&self) -> LiquidityReport {
        LiquidityReport::from_snapshot(&self.orderbook())
    }

    /// Candle series of the selected market.
    pub fn candles(&self) -> CandleView {
        self.candles.snapshot()
    }

    /// Latest funding snapshot.
    pub fn funding(&self) -> Option<FundingSnapshot> {
        self.funding.latest()
    }

    /// Observe funding updates.
    pub fn watch_funding(&self) -> watch::Receiver<Option<FundingSnapshot>> {
        self.funding.watch()
    }
}

impl std::fmt::Debug for MarketMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketMonitor")
            .field("selection", &self.selection())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::MockInfoClient;

    fn monitor() -> MarketMonitor {
        let connection = Arc::new(ConnectionManager::new("ws://127.0.0.1:1"));
        MarketMonitor::new(connection, Arc::new(MockInfoClient::new()), MonitorOptions::default())
    }

    #[tokio::test]
    async fn selecting_registers_interest_without_connecting() {
        let monitor = monitor();

        assert!(monitor.select_market("BTC", CandleInterval::H1));

        let router = monitor.router();
        assert_eq!(router.consumers(&Subscription::l2_book("BTC")), 1);
        assert_eq!(router.consumers(&Subscription::candle("BTC", CandleInterval::H1)), 1);
        assert!(!router.is_active(&Subscription::l2_book("BTC")));
        // candle aggregator + book session
        assert_eq!(monitor.connection().handler_count(), 2);
    }

    #[tokio::test]
    async fn reselecting_same_market_is_a_no_op() {
        let monitor = monitor();
        assert!(monitor.select_market("ETH", CandleInterval::M5));
        assert!(!monitor.select_market("ETH", CandleInterval::M5));
        assert_eq!(monitor.connection().handler_count(), 2);
    }

    #[tokio::test]
    async fn switching_moves_interest_and_replaces_session() {
        let monitor = monitor();
        monitor.select_market("BTC", CandleInterval::H1);
        monitor.select_market("SOL", CandleInterval::M15);

        let router = monitor.router();
        assert_eq!(router.consumers(&Subscription::l2_book("BTC")), 0);
        assert_eq!(router.consumers(&Subscription::l2_book("SOL")), 1);
        assert_eq!(router.consumers(&Subscription::candle("SOL", CandleInterval::M15)), 1);
        assert_eq!(monitor.connection().handler_count(), 2);
        assert_eq!(monitor.orderbook().coin, "SOL");
        assert_eq!(monitor.selection(), Some(MarketSelection::new("SOL", CandleInterval::M15)));
    }

    #[tokio::test]
    async fn connect_builds_from_config_without_dialing() {
        let monitor = MarketMonitor::connect(&Config::default()).unwrap();
        assert_eq!(monitor.status(), ConnectionStatus::Connecting);
        assert_eq!(monitor.connection().url(), Config::default().hyperliquid_ws_url);

        let invalid = Config {
            hyperliquid_info_url: "ftp://example.com".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            MarketMonitor::connect(&invalid),
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn empty_book_has_no_liquidity_rows() {
        let monitor = monitor();
        monitor.select_market("BTC", CandleInterval::H1);
        assert!(!monitor.liquidity().is_available());
        assert_eq!(monitor.wait_for_seed().await, Some(SeedOutcome::Loaded(0)));
    }
}
