//! WebSocket transport seam and the reconnecting socket built on top of it.
//!
//! Components never open sockets directly. They ask a [`Connector`] for a
//! [`Transport`], which lets the whole stack run against [`websocket::WsConnector`]
//! in production and against an in-memory peer in tests.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::warn;

use crate::{Result, TeleopError};

pub mod reconnect;
pub mod websocket;


pub use reconnect::{ReconnectPolicy, ReconnectingSocket, SocketEvent, SocketHandle};
pub use websocket::WsConnector;

/// One WebSocket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
}

impl WireMessage {
    /// Serialize a value as a JSON text message
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(WireMessage::Text(serde_json::to_string(value)?))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireMessage::Text(text) => Some(text),
            WireMessage::Binary(_) => None,
        }
    }
}

/// How inbound binary frames are surfaced (`isBinary`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Binary frames are delivered as bytes
    Binary,
    /// Binary frames are decoded as UTF-8 text
    Text,
}

impl FrameMode {
    /// Apply this mode to an inbound message
    ///
    /// A frame that is not valid UTF-8 on a text socket stays binary. Owners still see it,
    /// so reply-paced loops keep going.
    pub fn decode(self, message: WireMessage) -> WireMessage {
        match (self, message) {
            (FrameMode::Text, WireMessage::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => WireMessage::Text(text.to_string()),
                Err(e) => {
                    warn!("Binary frame on text socket is not UTF-8: {}", e);
                    WireMessage::Binary(data)
                }
            },
            (_, message) => message,
        }
    }
}

/// Lifecycle of one logical socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// Server origin the dashboard was loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Page scheme, `http` or `https`
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self { scheme: "http".to_string(), host: "localhost".to_string(), port: Some(8080) }
    }
}

impl Endpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self { scheme: scheme.into(), host: host.into(), port }
    }

    /// Take scheme, host and port from a page URL such as `https://rover.local:8443/`
    pub fn from_page_url(url: &str) -> Result<Self> {
        let uri: Uri = url.parse().map_err(|e| TeleopError::parse("page URL", e))?;
        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TeleopError::parse("page URL", format!("no host in '{}'", url)))?;
        Ok(Self::new(uri.scheme_str().unwrap_or("http"), host, uri.port_u16()))
    }

    /// `wss` for secure pages, `ws` otherwise
    pub fn websocket_scheme(&self) -> &'static str {
        if self.scheme.eq_ignore_ascii_case("https") || self.scheme.eq_ignore_ascii_case("wss") {
            "wss"
        } else {
            "ws"
        }
    }

    /// Full socket URL for a server path
    pub fn websocket_url(&self, path: &str) -> String {
        let separator = if path.starts_with('/') { "" } else { "/" };
        match self.port {
            Some(port) => {
                format!("{}://{}:{}{}{}", self.websocket_scheme(), self.host, port, separator, path)
            }
            None => format!("{}://{}{}{}", self.websocket_scheme(), self.host, separator, path),
        }
    }
}

/// Opens transports to the rover
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket to `url`
    ///
    /// Returns once the handshake completes. Any failure is reported as an error and
    /// handled by the caller's reconnect policy.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// An open, message-oriented socket
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, message: WireMessage) -> Result<()>;

    /// Next inbound message
    ///
    /// Returns:
    /// - `Some(Ok(message))` - Data frame received
    /// - `Some(Err(e))` - Transport failure, the socket is unusable
    /// - `None` - Peer closed the socket
    ///
    /// Must be cancel-safe: it is raced against outbound commands.
    async fn recv(&mut self) -> Option<Result<WireMessage>>;

    /// Close with an optional application status code
    async fn close(&mut self, code: Option<u16>) -> Result<()>;
}
