use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;

use hl_liquidity::candles::CandleInterval;
use hl_liquidity::feed::{
    ConnectionManager, ConnectionStatus, ControlMessage, InboundMessage, ReconnectConfig,
    Subscription, SubscriptionRouter,
};

use crate::support::{
    book_frame, refused_addr, wait_for_status, DroppingListener, MockFeedServer, WAIT,
};

fn manager(url: &str, delay_ms: u64, max_attempts: u32) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::with_config(
        url,
        ReconnectConfig::fixed(Duration::from_millis(delay_ms), max_attempts),
        None,
    ))
}

async fn connected(manager: &Arc<ConnectionManager>, server: &MockFeedServer) {
    manager.start();
    let mut status = manager.watch_status();
    wait_for_status(&mut status, |s| *s == ConnectionStatus::Connected).await;
    server.wait_for_connections(1).await;
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for handler")
        .expect("handler channel closed")
}

#[tokio::test]
async fn fan_out_reaches_every_handler_in_registration_order() {
    let server = MockFeedServer::start().await;
    let manager = manager(&server.url, 20, 5);
    let (tx, mut rx) = mpsc::unbounded_channel::<(&'static str, String)>();

    let first_tx = tx.clone();
    let _first = manager.subscribe(move |message: &InboundMessage| -> anyhow::Result<()> {
        first_tx.send(("first", message.channel().to_string()))?;
        Ok(())
    });
    let second_tx = tx.clone();
    let _second = manager.subscribe(move |message: &InboundMessage| -> anyhow::Result<()> {
        second_tx.send(("second", message.channel().to_string()))?;
        Ok(())
    });

    connected(&manager, &server).await;
    server.push_json(book_frame("BTC", &[("99", "1")], &[("101", "1")], 1));

    assert_eq!(recv(&mut rx).await, ("first", "l2Book".to_string()));
    assert_eq!(recv(&mut rx).await, ("second", "l2Book".to_string()));
    manager.stop().await;
}

#[tokio::test]
async fn failing_handlers_do_not_starve_the_rest() {
    let server = MockFeedServer::start().await;
    let manager = manager(&server.url, 20, 5);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let _erroring = manager.subscribe(|_: &InboundMessage| -> anyhow::Result<()> {
        Err(anyhow::anyhow!("boom"))
    });
    let _panicking = manager.subscribe(|_: &InboundMessage| -> anyhow::Result<()> {
        panic!("handler bug")
    });
    let _healthy = manager.subscribe(move |message: &InboundMessage| -> anyhow::Result<()> {
        tx.send(message.channel().to_string())?;
        Ok(())
    });

    connected(&manager, &server).await;
    server.push_json(json!({ "channel": "pong" }));
    server.push_json(json!({ "channel": "subscriptionResponse", "data": {} }));

    assert_eq!(recv(&mut rx).await, "pong");
    assert_eq!(recv(&mut rx).await, "subscriptionResponse");
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    manager.stop().await;
}

#[tokio::test]
async fn unparseable_frames_are_dropped_without_disconnecting() {
    let server = MockFeedServer::start().await;
    let manager = manager(&server.url, 20, 5);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let _handler = manager.subscribe(move |message: &InboundMessage| -> anyhow::Result<()> {
        tx.send(message.channel().to_string())?;
        Ok(())
    });

    connected(&manager, &server).await;
    server.push("not json at all");
    server.push_json(json!({ "channel": "l2Book", "data": { "coin": "BTC" } }));
    server.push_json(json!({ "channel": "pong" }));

    assert_eq!(recv(&mut rx).await, "pong");
    assert_eq!(manager.connection_epoch(), 1);
    manager.stop().await;
}

#[tokio::test]
async fn send_before_open_is_dropped() {
    let manager = ConnectionManager::new("ws://127.0.0.1:1");
    assert!(!manager.send(&ControlMessage::subscribe(Subscription::l2_book("BTC"))));
    assert_eq!(manager.status(), ConnectionStatus::Connecting);
}

#[tokio::test]
async fn pending_subscriptions_are_sent_once_connected() {
    let server = MockFeedServer::start().await;
    let manager = manager(&server.url, 20, 5);
    let router = Arc::new(SubscriptionRouter::new(manager.clone()));
    let observer = router.spawn_observer(manager.watch_status());

    router.acquire(Subscription::l2_book("ETH"));
    router.acquire(Subscription::l2_book("ETH"));
    assert!(!router.is_active(&Subscription::l2_book("ETH")));

    connected(&manager, &server).await;

    assert_eq!(
        server.next_received().await,
        json!({ "method": "subscribe", "subscription": { "type": "l2Book", "coin": "ETH" } })
    );
    // refcount of two still means a single subscribe
    assert!(server.received_within(Duration::from_millis(100)).await.is_none());

    router.release(&Subscription::l2_book("ETH"));
    assert!(server.received_within(Duration::from_millis(100)).await.is_none());
    router.release(&Subscription::l2_book("ETH"));
    assert_eq!(
        server.next_received().await,
        json!({ "method": "unsubscribe", "subscription": { "type": "l2Book", "coin": "ETH" } })
    );

    observer.abort();
    manager.stop().await;
}

#[tokio::test]
async fn subscriptions_are_reissued_after_reconnect() {
    let server = MockFeedServer::start().await;
    let manager = manager(&server.url, 20, 5);
    let router = Arc::new(SubscriptionRouter::new(manager.clone()));
    let observer = router.spawn_observer(manager.watch_status());
    router.acquire(Subscription::candle("SOL", CandleInterval::M5));

    connected(&manager, &server).await;
    let expected = json!({
        "method": "subscribe",
        "subscription": { "type": "candle", "coin": "SOL", "interval": "5m" }
    });
    assert_eq!(server.next_received().await, expected);

    server.drop_client();
    server.wait_for_connections(2).await;

    assert_eq!(server.next_received().await, expected);
    assert_eq!(manager.connection_epoch(), 2);
    assert_eq!(manager.reconnect_attempts(), 0);

    observer.abort();
    manager.stop().await;
}

#[tokio::test]
async fn gives_up_after_max_attempts_until_restarted() {
    let addr = refused_addr().await;
    let manager = manager(&format!("ws://{addr}"), 10, 5);
    let mut status = manager.watch_status();

    manager.start();
    wait_for_status(&mut status, |s| *s == ConnectionStatus::Error).await;
    assert_eq!(manager.reconnect_attempts(), 5);

    // still terminal after a while
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.status(), ConnectionStatus::Error);

    let server = MockFeedServer::start_on(addr).await;
    assert_eq!(server.addr(), addr);
    manager.restart().await;
    wait_for_status(&mut status, |s| *s == ConnectionStatus::Connected).await;
    assert_eq!(manager.reconnect_attempts(), 0);
    manager.stop().await;
}

#[tokio::test]
async fn dials_once_plus_five_reconnects_then_stops() {
    let listener = DroppingListener::start().await;
    let manager = manager(&listener.url, 10, 5);
    let mut status = manager.watch_status();

    manager.start();
    wait_for_status(&mut status, |s| *s == ConnectionStatus::Error).await;

    // no sixth reconnect is scheduled
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(listener.accepts(), 6);
    assert_eq!(manager.reconnect_attempts(), 5);
    assert_eq!(manager.connection_epoch(), 0);
}

#[tokio::test]
async fn stop_cancels_pending_reconnect() {
    let addr = refused_addr().await;
    let manager = manager(&format!("ws://{addr}"), 10_000, 5);
    let mut status = manager.watch_status();

    manager.start();
    wait_for_status(&mut status, |s| *s == ConnectionStatus::Reconnecting).await;

    tokio::time::timeout(Duration::from_secs(1), manager.stop())
        .await
        .expect("stop waited for the reconnect delay");
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert!(!manager.send_text("{}".to_string()));
}

#[tokio::test]
async fn heartbeat_pings_while_connected() {
    let server = MockFeedServer::start().await;
    let manager = Arc::new(ConnectionManager::with_config(
        server.url.clone(),
        ReconnectConfig::fixed(Duration::from_millis(20), 5),
        Some(Duration::from_millis(50)),
    ));

    connected(&manager, &server).await;

    assert_eq!(server.next_received().await, json!({ "method": "ping" }));
    assert_eq!(server.next_received().await, json!({ "method": "ping" }));
    manager.stop().await;
}
