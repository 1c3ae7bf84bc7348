use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use hl_liquidity::candles::{Candle, CandleInterval, LoadState, SeedOutcome};
use hl_liquidity::feed::{ConnectionManager, ConnectionStatus, ReconnectConfig};
use hl_liquidity::info::{FundingSnapshot, MockInfoClient};
use hl_liquidity::monitor::{MarketMonitor, MonitorOptions};
use hl_liquidity::utils::now_ms;

use crate::support::{book_frame, candle_frame, wait_for_status, MockFeedServer, WAIT};

const HOUR_MS: i64 = 3_600_000;

struct Harness {
    server: MockFeedServer,
    source: Arc<MockInfoClient>,
    monitor: MarketMonitor,
}

async fn harness() -> Harness {
    let server = MockFeedServer::start().await;
    let source = Arc::new(MockInfoClient::new());
    let connection = Arc::new(ConnectionManager::with_config(
        server.url.clone(),
        ReconnectConfig::fixed(Duration::from_millis(20), 5),
        None,
    ));
    let monitor = MarketMonitor::new(
        connection,
        source.clone(),
        MonitorOptions {
            funding_period: Duration::from_secs(1),
            ..MonitorOptions::default()
        },
    );
    Harness {
        server,
        source,
        monitor,
    }
}

impl Harness {
    async fn connect(&self) {
        self.monitor.start();
        let mut status = self.monitor.connection().watch_status();
        wait_for_status(&mut status, |s| *s == ConnectionStatus::Connected).await;
        self.server.wait_for_connections(1).await;
    }

    async fn control_frames(&self, n: usize) -> Vec<String> {
        let mut frames: Vec<String> = self
            .server
            .next_received_n(n)
            .await
            .iter()
            .map(Value::to_string)
            .collect();
        frames.sort();
        frames
    }
}

fn sorted(frames: Vec<Value>) -> Vec<String> {
    let mut frames: Vec<String> = frames.iter().map(Value::to_string).collect();
    frames.sort();
    frames
}

fn hourly_candles(base: i64, closes: &[&str]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let close = close.parse().unwrap();
            Candle {
                time: base + i as i64 * HOUR_MS,
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(10),
            }
        })
        .collect()
}

#[tokio::test]
async fn book_frames_produce_liquidity_metrics() {
    let h = harness().await;
    h.monitor.select_market("BTC", CandleInterval::H1);
    h.connect().await;
    h.control_frames(2).await;

    h.server.push_json(book_frame(
        "BTC",
        &[("99.5", "2"), ("99", "5")],
        &[("100.5", "3"), ("101", "4")],
        1_700_000_000_000,
    ));

    let mut books = h.monitor.watch_orderbook().unwrap();
    tokio::time::timeout(WAIT, books.wait_for(|book| book.is_two_sided()))
        .await
        .unwrap()
        .unwrap();

    let report = h.monitor.liquidity();
    assert!(report.is_available());
    assert_eq!(report.mid_price, dec!(100));
    assert_eq!(report.spread, dec!(1));
    assert_eq!(report.depth.len(), 5);
    assert_eq!(report.slippage.len(), 3);

    let at_100 = report.depth.iter().find(|d| d.distance_bps == 100).unwrap();
    assert_eq!(at_100.bid_depth_usd, dec!(694));
    assert_eq!(at_100.ask_depth_usd, dec!(705.5));
    let at_10 = report.depth.iter().find(|d| d.distance_bps == 10).unwrap();
    assert_eq!(at_10.bid_depth_usd, dec!(0));

    h.monitor.shutdown().await;
}

#[tokio::test]
async fn seed_then_live_candles_merge() {
    let h = harness().await;
    let base = (now_ms() / HOUR_MS - 3) * HOUR_MS;
    h.source
        .set_candles("BTC", CandleInterval::H1, hourly_candles(base, &["100", "101", "102"]));

    h.monitor.select_market("BTC", CandleInterval::H1);
    assert_eq!(h.monitor.wait_for_seed().await, Some(SeedOutcome::Loaded(3)));
    assert_eq!(h.monitor.candles().load_state, LoadState::Ready);

    h.connect().await;
    h.control_frames(2).await;

    // newer bucket appends, current bucket replaces
    h.server.push_json(candle_frame("BTC", "1h", base + 3 * HOUR_MS, "103", "1"));
    h.server.push_json(candle_frame("BTC", "1h", base + 3 * HOUR_MS, "104", "2"));
    // other interval is ignored
    h.server.push_json(candle_frame("BTC", "5m", base + 4 * HOUR_MS, "999", "1"));
    h.server.push_json(book_frame("BTC", &[("1", "1")], &[("2", "1")], 1));

    let mut books = h.monitor.watch_orderbook().unwrap();
    tokio::time::timeout(WAIT, books.wait_for(|book| book.is_two_sided()))
        .await
        .unwrap()
        .unwrap();

    let view = h.monitor.candles();
    assert_eq!(view.candles.len(), 4);
    let last = view.candles.last().unwrap();
    assert_eq!(last.time, base + 3 * HOUR_MS);
    assert_eq!(last.close, dec!(104));
    assert_eq!(view.volumes.len(), 4);

    h.monitor.shutdown().await;
}

#[tokio::test]
async fn switching_market_moves_subscriptions_on_the_same_connection() {
    let h = harness().await;
    h.monitor.select_market("BTC", CandleInterval::H1);
    h.connect().await;

    assert_eq!(
        h.control_frames(2).await,
        sorted(vec![
            json!({ "method": "subscribe", "subscription": { "type": "l2Book", "coin": "BTC" } }),
            json!({ "method": "subscribe", "subscription": { "type": "candle", "coin": "BTC", "interval": "1h" } }),
        ])
    );

    assert!(h.monitor.select_market("ETH", CandleInterval::M15));
    assert_eq!(
        h.control_frames(4).await,
        sorted(vec![
            json!({ "method": "unsubscribe", "subscription": { "type": "l2Book", "coin": "BTC" } }),
            json!({ "method": "unsubscribe", "subscription": { "type": "candle", "coin": "BTC", "interval": "1h" } }),
            json!({ "method": "subscribe", "subscription": { "type": "l2Book", "coin": "ETH" } }),
            json!({ "method": "subscribe", "subscription": { "type": "candle", "coin": "ETH", "interval": "15m" } }),
        ])
    );

    // a late frame for the old coin must not reach the new session
    h.server.push_json(book_frame("BTC", &[("99", "1")], &[("101", "1")], 1));
    h.server.push_json(book_frame("ETH", &[("1999", "1")], &[("2001", "1")], 2));

    let mut books = h.monitor.watch_orderbook().unwrap();
    tokio::time::timeout(WAIT, books.wait_for(|book| book.is_two_sided()))
        .await
        .unwrap()
        .unwrap();

    let book = h.monitor.orderbook();
    assert_eq!(book.coin, "ETH");
    assert_eq!(book.mid_price, dec!(2000));
    assert_eq!(h.monitor.connection().connection_epoch(), 1);
    assert_eq!(h.server.connections(), 1);

    h.monitor.shutdown().await;
}

#[tokio::test]
async fn funding_follows_the_selected_coin() {
    let h = harness().await;
    h.source.set_funding(FundingSnapshot {
        coin: "SOL".to_string(),
        funding_rate: dec!(0.0000125),
        mark_price: dec!(150),
        open_interest_usd: dec!(75000000),
        volume_24h_usd: dec!(1200000000),
    });

    h.monitor.select_market("SOL", CandleInterval::H1);
    let mut funding = h.monitor.watch_funding();
    let snapshot = tokio::time::timeout(WAIT, funding.wait_for(Option::is_some))
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();

    assert_eq!(snapshot.coin, "SOL");
    assert_eq!(snapshot.funding_rate, dec!(0.0000125));
    assert!(h.source.funding_calls() >= 1);

    h.monitor.shutdown().await;
}
