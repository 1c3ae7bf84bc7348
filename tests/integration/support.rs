//! In-process WebSocket server standing in for the exchange feed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use hl_liquidity::feed::ConnectionStatus;

pub const WAIT: Duration = Duration::from_secs(5);

/// Accepts clients one at a time, records what they send and lets the test
/// push frames to the latest client.
pub struct MockFeedServer {
    pub url: String,
    addr: SocketAddr,
    peer: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    connections: Arc<AtomicUsize>,
    received: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    task: JoinHandle<()>,
}

impl MockFeedServer {
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap()).await
    }

    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = Arc::new(Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));
        let (received_tx, received_rx) = mpsc::unbounded_channel();

        let task = {
            let peer = Arc::clone(&peer);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&peer),
                        Arc::clone(&connections),
                        received_tx.clone(),
                    ));
                }
            })
        };

        Self {
            url: format!("ws://{addr}"),
            addr,
            peer,
            connections,
            received: tokio::sync::Mutex::new(received_rx),
            task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Clients accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, n: usize) {
        tokio::time::timeout(WAIT, async {
            while self.connections() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client did not connect");
    }

    /// Send a text frame to the latest client.
    pub fn push(&self, text: impl Into<String>) {
        let peer = self.peer.lock();
        let tx = peer.as_ref().expect("no client connected");
        tx.send(Message::Text(text.into())).expect("client writer gone");
    }

    pub fn push_json(&self, value: Value) {
        self.push(value.to_string());
    }

    /// Close the latest client's connection from the server side.
    pub fn drop_client(&self) {
        if let Some(tx) = self.peer.lock().take() {
            let _ = tx.send(Message::Close(None));
        }
    }

    /// Next text frame any client sent, parsed as JSON.
    pub async fn next_received(&self) -> Value {
        let mut received = self.received.lock().await;
        let text = tokio::time::timeout(WAIT, received.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server stopped");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Collect the next `n` frames.
    pub async fn next_received_n(&self, n: usize) -> Vec<Value> {
        let mut frames = Vec::with_capacity(n);
        for _ in 0..n {
            frames.push(self.next_received().await);
        }
        frames
    }

    /// Whether a frame arrives within `window`.
    pub async fn received_within(&self, window: Duration) -> Option<Value> {
        let mut received = self.received.lock().await;
        match tokio::time::timeout(window, received.recv()).await {
            Ok(Some(text)) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }
}

impl Drop for MockFeedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    peer: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    connections: Arc<AtomicUsize>,
    received: mpsc::UnboundedSender<String>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    *peer.lock() = Some(tx);
    connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            Some(outgoing) = rx.recv() => {
                let closing = matches!(outgoing, Message::Close(_));
                if write.send(outgoing).await.is_err() || closing {
                    break;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = received.send(text);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Accepts TCP connections and drops them before the WebSocket handshake,
/// counting every dial.
pub struct DroppingListener {
    pub url: String,
    accepts: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl DroppingListener {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepts);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        Self {
            url: format!("ws://{addr}"),
            accepts,
            task,
        }
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

impl Drop for DroppingListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Wait until `status` satisfies `predicate`.
pub async fn wait_for_status(
    status: &mut watch::Receiver<ConnectionStatus>,
    predicate: impl FnMut(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    let reached = tokio::time::timeout(WAIT, status.wait_for(predicate))
        .await
        .expect("timed out waiting for connection status")
        .expect("status sender dropped");
    *reached
}

/// Address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn book_frame(coin: &str, bids: &[(&str, &str)], asks: &[(&str, &str)], time: i64) -> Value {
    let side = |levels: &[(&str, &str)]| -> Vec<Value> {
        levels
            .iter()
            .map(|(px, sz)| serde_json::json!({ "px": px, "sz": sz, "n": 1 }))
            .collect()
    };
    serde_json::json!({
        "channel": "l2Book",
        "data": { "coin": coin, "time": time, "levels": [side(bids), side(asks)] }
    })
}

pub fn candle_frame(coin: &str, interval: &str, open_time: i64, close: &str, volume: &str) -> Value {
    serde_json::json!({
        "channel": "candle",
        "data": {
            "t": open_time, "T": open_time + 59_999, "s": coin, "i": interval,
            "o": close, "h": close, "l": close, "c": close, "v": volume, "n": 3
        }
    })
}
