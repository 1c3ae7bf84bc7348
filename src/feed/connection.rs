//! Shared streaming connection with automatic reconnection and fan-out.
//!
//! One [`ConnectionManager`] owns the single WebSocket to the exchange. Its
//! lifecycle is driven explicitly with [`start`](ConnectionManager::start),
//! [`stop`](ConnectionManager::stop) and
//! [`restart`](ConnectionManager::restart); registering or dropping handlers
//! never opens or closes the transport.
//!
//! Features:
//! - Fixed-delay reconnection with an attempt cap, then a terminal `Error`
//! - Handler registry keyed by stable ids, dispatched in registration order
//! - Per-handler failure and panic isolation
//! - Application-level heartbeat

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use strum::Display;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{decode_frame, ControlMessage, InboundMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::error::FeedError;
use crate::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    /// First connection attempt in progress.
    Connecting,
    /// Transport open.
    Connected,
    /// Transport closed or failed, or stopped by the owner.
    Disconnected,
    /// Waiting for or performing a reconnect attempt.
    Reconnecting,
    /// Reconnect attempts exhausted; terminal until restarted.
    Error,
}

/// Receives every successfully decoded inbound message.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one message. Errors are logged by the dispatcher.
    fn on_message(&self, message: &InboundMessage) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&InboundMessage) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_message(&self, message: &InboundMessage) -> anyhow::Result<()> {
        self(message)
    }
}

/// Stable handler identifier.
pub type HandlerId = u64;

/// Result of fanning one message out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Registry of message handlers, iterated in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<HandlerId, Arc<dyn MessageHandler>>>,
}

impl HandlerRegistry {
    fn register(&self, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().insert(id, handler);
        id
    }

    fn remove(&self, id: HandlerId) -> bool {
        self.handlers.lock().remove(&id).is_some()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    /// Deliver `message` to every handler registered at call time.
    ///
    /// The registry lock is released before handlers run, so handlers may
    /// register or remove handlers themselves.
    pub fn dispatch(&self, message: &InboundMessage) -> DispatchReport {
        let handlers: Vec<(HandlerId, Arc<dyn MessageHandler>)> = self
            .handlers
            .lock()
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.on_message(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    metrics::inc_handler_failures();
                    error!(handler = id, channel = message.channel(), error = %e, "Message handler failed");
                }
                Err(payload) => {
                    report.failed += 1;
                    metrics::inc_handler_failures();
                    error!(
                        handler = id,
                        channel = message.channel(),
                        panic = %panic_message(payload.as_ref()),
                        "Message handler panicked"
                    );
                }
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Removes its handler from the registry when dropped.
#[must_use = "dropping the guard unregisters the handler"]
pub struct HandlerGuard {
    id: HandlerId,
    registry: Weak<HandlerRegistry>,
}

impl HandlerGuard {
    /// Id of the registered handler.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Unregister the handler now.
    pub fn unsubscribe(self) {}
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                debug!(handler = self.id, "Message handler removed");
            }
        }
    }
}

impl std::fmt::Debug for HandlerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerGuard").field("id", &self.id).finish()
    }
}

/// Owns the streaming connection shared by every consumer.
pub struct ConnectionManager {
    /// WebSocket URL.
    url: String,
    /// Reconnection configuration.
    reconnect_config: ReconnectConfig,
    /// Ping period while connected.
    heartbeat: Option<Duration>,
    /// Registered handlers.
    registry: Arc<HandlerRegistry>,
    /// Current status, observable by any number of watchers.
    status_tx: watch::Sender<ConnectionStatus>,
    /// Writer for the open transport, `None` while not open.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Incremented on every successful open.
    epoch: AtomicU64,
    /// Consecutive reconnect attempts since the last open.
    reconnect_attempts: AtomicU32,
    /// Set to request teardown.
    shutdown_tx: watch::Sender<bool>,
    /// Connection task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager with the default reconnect policy and no heartbeat.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, ReconnectConfig::default(), None)
    }

    /// Create a manager with a custom reconnect policy and heartbeat.
    pub fn with_config(
        url: impl Into<String>,
        reconnect_config: ReconnectConfig,
        heartbeat: Option<Duration>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Connecting);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            url: url.into(),
            reconnect_config,
            heartbeat,
            registry: Arc::new(HandlerRegistry::default()),
            status_tx,
            outbound: Mutex::new(None),
            epoch: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// Streaming URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// Subscribe to status transitions.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Number of successful opens so far.
    pub fn connection_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a handler for every decoded inbound message.
    pub fn subscribe<H: MessageHandler>(&self, handler: H) -> HandlerGuard {
        let id = self.registry.register(Arc::new(handler));
        debug!(handler = id, "Message handler registered");
        HandlerGuard {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Write a control message if the transport is open.
    ///
    /// Messages are never buffered for a later connection; when the
    /// transport is not open the call only logs and returns `false`.
    pub fn send(&self, message: &ControlMessage) -> bool {
        match message.to_json() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!(error = %e, "Failed to encode control message");
                false
            }
        }
    }

    /// Write a raw text frame if the transport is open.
    pub fn send_text(&self, text: String) -> bool {
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            metrics::inc_ws_sends_dropped();
            debug!(payload = %text, status = %self.status(), "WebSocket not open, message not sent");
            return false;
        };
        if tx.send(Message::Text(text)).is_err() {
            metrics::inc_ws_sends_dropped();
            debug!("WebSocket writer gone, message not sent");
            return false;
        }
        true
    }

    /// Start the connection task if it is not already running.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Connection task already running");
            return;
        }

        self.shutdown_tx.send_replace(false);
        let shutdown = self.shutdown_tx.subscribe();
        let manager = Arc::clone(self);
        *task = Some(tokio::spawn(manager.run(shutdown)));
    }

    /// Tear the connection down and cancel any pending reconnect.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Connection task ended abnormally");
            }
        }
        self.clear_outbound();
        self.set_status(ConnectionStatus::Disconnected);
        info!("Connection stopped");
    }

    /// Stop, then start again with a fresh reconnect budget.
    pub async fn restart(self: &Arc<Self>) {
        self.stop().await;
        self.start();
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status_tx.send_replace(status);
        metrics::set_ws_connected(status == ConnectionStatus::Connected);
        if previous != status {
            debug!(from = %previous, to = %status, "Connection status changed");
        }
    }

    fn clear_outbound(&self) {
        self.outbound.lock().take();
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut policy = ReconnectPolicy::new(self.reconnect_config.clone());
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Connecting);

        loop {
            info!(url = %self.url, attempt = policy.attempts(), "Connecting to WebSocket");

            let connected = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match connected {
                Ok((stream, _)) => {
                    policy.reset();
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    if self.drive(stream, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    let e = FeedError::ConnectionFailed(e.to_string());
                    error!(error = %e, attempt = policy.attempts(), "WebSocket connection failed");
                }
            }

            if *shutdown.borrow() {
                break;
            }

            self.set_status(ConnectionStatus::Disconnected);

            let Some(delay) = policy.next_delay() else {
                metrics::inc_ws_give_ups();
                error!(
                    attempts = policy.attempts(),
                    "Maximum reconnection attempts reached, giving up"
                );
                self.set_status(ConnectionStatus::Error);
                return;
            };

            self.reconnect_attempts.store(policy.attempts(), Ordering::SeqCst);
            metrics::inc_ws_reconnects();
            self.set_status(ConnectionStatus::Reconnecting);
            info!(
                attempt = policy.attempts(),
                max_attempts = policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after delay"
            );

            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.clear_outbound();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Pump one open connection. Returns `true` when teardown was requested.
    async fn drive(&self, stream: WsStream, shutdown: &mut watch::Receiver<bool>) -> bool {
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        *self.outbound.lock() = Some(tx);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_status(ConnectionStatus::Connected);
        info!(url = %self.url, epoch, "WebSocket connected");

        let mut heartbeat = self.heartbeat.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let stopped = loop {
            tokio::select! {
                _ = shutdown_requested(shutdown) => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    break true;
                }
                Some(outgoing) = rx.recv() => {
                    if let Err(e) = write.send(outgoing).await {
                        error!(error = %FeedError::from(e), "WebSocket write failed");
                        break false;
                    }
                }
                _ = next_tick(&mut heartbeat) => {
                    match ControlMessage::ping().to_json() {
                        Ok(ping) => {
                            if let Err(e) = write.send(Message::Text(ping)).await {
                                warn!(error = %FeedError::from(e), "Heartbeat ping failed");
                                break false;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to encode heartbeat"),
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.handle_frame(text),
                        Err(e) => {
                            metrics::inc_ws_frames_dropped();
                            warn!(error = %e, "Dropping non-UTF-8 binary frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        warn!(error = %closed_by_peer(frame), "WebSocket closed by peer");
                        break false;
                    }
                    Some(Ok(_)) => {
                        // tungstenite answers pings itself
                    }
                    Some(Err(e)) => {
                        error!(error = %FeedError::from(e), "WebSocket error");
                        break false;
                    }
                    None => {
                        let e = FeedError::ConnectionClosed {
                            code: None,
                            reason: "stream ended".to_string(),
                        };
                        warn!(error = %e, "WebSocket stream ended");
                        break false;
                    }
                }
            }
        };

        self.clear_outbound();
        stopped
    }

    fn handle_frame(&self, text: &str) {
        let _timer = metrics::timer_ws_message();
        metrics::inc_ws_messages_received();

        match decode_frame(text) {
            Ok(message) => {
                let report = self.registry.dispatch(&message);
                if report.failed > 0 {
                    debug!(
                        channel = message.channel(),
                        delivered = report.delivered,
                        failed = report.failed,
                        "Dispatch completed with failures"
                    );
                }
            }
            Err(e) => {
                metrics::inc_ws_frames_dropped();
                warn!(error = %e, "Dropping unparseable frame");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("status", &self.status())
            .field("handlers", &self.registry.len())
            .finish()
    }
}

fn closed_by_peer(frame: Option<CloseFrame<'_>>) -> FeedError {
    match frame {
        Some(frame) => FeedError::ConnectionClosed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.into_owned(),
        },
        None => FeedError::ConnectionClosed {
            code: None,
            reason: String::new(),
        },
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also counts as teardown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
