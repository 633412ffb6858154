//! In-memory rover for tests
//!
//! [`MockConnector`] hands every accepted connection to a [`MockServer`] as a
//! [`MockPeer`], so a test plays the rover side of each socket: it reads what the
//! client sent, answers with text or binary frames, and hangs up at will.

#![cfg(any(test, feature = "test-util"))]

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::connection::{Connector, Transport, WireMessage};
use crate::input::{GamepadDevice, GamepadSnapshot};
use crate::{Result, TeleopError};

/// What the client did on a mock socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Message(WireMessage),
    Close(Option<u16>),
}

/// Connector that routes every socket to a [`MockServer`]
pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    attempts: AtomicUsize,
    refusals: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, MockServer) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let connector =
            Arc::new(Self { peers: peer_tx, attempts: AtomicUsize::new(0), refusals: AtomicUsize::new(0) });
        (connector, MockServer { peers: peer_rx, pending: VecDeque::new() })
    }

    /// Fail the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TeleopError::connection_failed(format!("{} refused", url)));
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let peer = MockPeer { url: url.to_string(), from_client: client_rx, to_client: Some(server_tx) };
        self.peers.send(peer).map_err(|_| TeleopError::connection_failed("mock server dropped"))?;

        Ok(Box::new(MockTransport { to_server: client_tx, from_server: server_rx }))
    }
}

struct MockTransport {
    to_server: mpsc::UnboundedSender<ClientFrame>,
    from_server: mpsc::UnboundedReceiver<WireMessage>,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: WireMessage) -> Result<()> {
        self.to_server
            .send(ClientFrame::Message(message))
            .map_err(|_| TeleopError::connection_failed("mock peer hung up"))
    }

    async fn recv(&mut self) -> Option<Result<WireMessage>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self, code: Option<u16>) -> Result<()> {
        let _ = self.to_server.send(ClientFrame::Close(code));
        self.from_server.close();
        Ok(())
    }
}

/// Accepts mock connections in arrival order
pub struct MockServer {
    peers: mpsc::UnboundedReceiver<MockPeer>,
    pending: VecDeque<MockPeer>,
}

impl MockServer {
    /// Next connection to any path
    pub async fn accept(&mut self) -> MockPeer {
        if let Some(peer) = self.pending.pop_front() {
            return peer;
        }
        self.peers.recv().await.expect("mock connector dropped")
    }

    /// Next connection whose URL ends with `path`; others are kept for later
    pub async fn accept_path(&mut self, path: &str) -> MockPeer {
        if let Some(index) = self.pending.iter().position(|peer| peer.url.ends_with(path)) {
            return self.pending.remove(index).expect("index in range");
        }
        loop {
            let peer = self.peers.recv().await.expect("mock connector dropped");
            if peer.url.ends_with(path) {
                return peer;
            }
            self.pending.push_back(peer);
        }
    }

    /// Whether a connection arrives within `wait`
    pub async fn try_accept(&mut self, wait: Duration) -> Option<MockPeer> {
        if let Some(peer) = self.pending.pop_front() {
            return Some(peer);
        }
        tokio::time::timeout(wait, self.peers.recv()).await.ok().flatten()
    }
}

/// Rover side of one mock socket
pub struct MockPeer {
    pub url: String,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
    to_client: Option<mpsc::UnboundedSender<WireMessage>>,
}

impl MockPeer {
    /// Next thing the client did, `None` once the client side is gone
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.from_client.recv().await
    }

    /// Next message, panicking on close
    pub async fn expect_message(&mut self) -> WireMessage {
        match self.recv().await {
            Some(ClientFrame::Message(message)) => message,
            other => panic!("expected a message on {}, got {:?}", self.url, other),
        }
    }

    /// Next message parsed as JSON
    pub async fn expect_json(&mut self) -> serde_json::Value {
        match self.expect_message().await {
            WireMessage::Text(text) => serde_json::from_str(&text).expect("client sent invalid JSON"),
            WireMessage::Binary(_) => panic!("expected JSON text on {}", self.url),
        }
    }

    /// Next close, skipping messages
    pub async fn expect_close(&mut self) -> Option<u16> {
        loop {
            match self.recv().await {
                Some(ClientFrame::Close(code)) => return code,
                Some(ClientFrame::Message(_)) => continue,
                None => panic!("client on {} went away without closing", self.url),
            }
        }
    }

    /// Messages already queued, without waiting
    pub fn drain(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn send_text(&self, text: impl Into<String>) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(WireMessage::Text(text.into()));
        }
    }

    pub fn send_json(&self, value: &serde_json::Value) {
        self.send_text(value.to_string());
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(WireMessage::Binary(data.into()));
        }
    }

    /// Hang up from the rover side
    pub fn disconnect(&mut self) {
        self.to_client = None;
    }
}

/// Smallest JPEG-looking payload
pub fn fake_jpeg(marker: u8) -> Bytes {
    Bytes::from(vec![0xff, 0xd8, marker, 0xff, 0xd9])
}

/// Gamepad whose state the test sets directly; clones share state
#[derive(Clone)]
pub struct SharedGamepad {
    state: Arc<Mutex<Option<GamepadSnapshot>>>,
}

impl SharedGamepad {
    pub fn new(snapshot: GamepadSnapshot) -> Self {
        Self { state: Arc::new(Mutex::new(Some(snapshot))) }
    }

    pub fn set(&self, snapshot: GamepadSnapshot) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Unplug; snapshots return `None` until the next `set`
    pub fn disconnect(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl GamepadDevice for SharedGamepad {
    fn snapshot(&mut self) -> Option<GamepadSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
