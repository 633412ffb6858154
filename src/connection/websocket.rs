//! tokio-tungstenite transport

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use super::{Connector, Transport, WireMessage};
use crate::{Result, TeleopError};

/// A handshake that takes longer than this counts as a failed connect
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector for real rover sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let handshake = tokio_tungstenite::connect_async(url);
        let (stream, response) = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake)
            .await
            .map_err(|_| TeleopError::Timeout { duration: HANDSHAKE_TIMEOUT })?
            .map_err(|e| {
                let reason = format!("handshake with {} failed", url);
                TeleopError::connection_failed_with_source(reason, Box::new(e))
            })?;
        debug!("WebSocket handshake with {} complete ({})", url, response.status());
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: WireMessage) -> Result<()> {
        let message = match message {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(data) => Message::Binary(data.to_vec()),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<WireMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(WireMessage::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(WireMessage::Binary(data.into()))),
                Ok(Message::Close(frame)) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    return None;
                }
                Ok(other) => trace!("Ignoring control frame ({} bytes)", other.len()),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self, code: Option<u16>) -> Result<()> {
        let frame = code.map(|code| CloseFrame { code: CloseCode::from(code), reason: "".into() });
        self.stream.close(frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_the_handshake() {
        // Accepts TCP but never answers the upgrade request
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws/ctl", listener.local_addr().unwrap());

        let error = match WsConnector.connect(&url).await {
            Ok(_) => panic!("handshake should not complete"),
            Err(e) => e,
        };
        assert!(matches!(error, TeleopError::Timeout { duration } if duration == HANDSHAKE_TIMEOUT));
        assert!(error.is_retryable());
        drop(listener);
    }
}
