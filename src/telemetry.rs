//! Server telemetry feed on `/ws/log`
//!
//! The rover only answers when asked, so the feed sends an empty `{}` request when the
//! socket opens and again after every reply, no faster than the poll interval. Each
//! reply is decorated once and published as the latest message.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::TelemetryConfig;
use crate::connection::{
    ConnectionState, Connector, Endpoint, FrameMode, ReconnectPolicy, ReconnectingSocket,
    SocketEvent, SocketHandle, WireMessage,
};
use crate::types::ServerTelemetryMessage;

/// Server path of the telemetry socket
pub const TELEMETRY_PATH: &str = "/ws/log";

/// Handle on the telemetry feed; dropping it closes the socket
pub struct TelemetryFeed {
    messages: watch::Receiver<Option<Arc<ServerTelemetryMessage>>>,
    connection: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl TelemetryFeed {
    pub fn spawn(connector: Arc<dyn Connector>, endpoint: &Endpoint, config: &TelemetryConfig) -> Self {
        let policy =
            ReconnectPolicy::new(TELEMETRY_PATH, FrameMode::Text, config.reconnect_delay());
        let (socket, socket_events) = ReconnectingSocket::spawn(connector, endpoint, policy);
        let connection = socket.state();
        let (message_tx, message_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let task = TelemetryTask {
            socket,
            socket_events,
            poll_interval: config.poll_interval(),
            last_request: None,
            next_request: None,
            received: 0,
            messages: message_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Self { messages: message_rx, connection, cancel }
    }

    /// Most recent message, if any arrived yet
    pub fn latest(&self) -> Option<Arc<ServerTelemetryMessage>> {
        self.messages.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ServerTelemetryMessage>>> {
        self.messages.clone()
    }

    /// Latest-wins stream of messages, starting with the current one if any
    pub fn updates(&self) -> impl Stream<Item = Arc<ServerTelemetryMessage>> + 'static {
        WatchStream::new(self.messages.clone()).filter_map(|message| async move { message })
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }
}

impl Drop for TelemetryFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct TelemetryTask {
    socket: SocketHandle,
    socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    poll_interval: std::time::Duration,
    last_request: Option<Instant>,
    next_request: Option<Instant>,
    received: u64,
    messages: watch::Sender<Option<Arc<ServerTelemetryMessage>>>,
    cancel: CancellationToken,
}

impl TelemetryTask {
    async fn run(mut self) {
        info!("Telemetry feed started");

        loop {
            let next_request = self.next_request;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.socket_events.recv() => match event {
                    Some(event) => self.handle_socket_event(event),
                    None => break,
                },
                _ = sleep_until_deadline(next_request) => {
                    self.next_request = None;
                    self.request();
                }
            }
        }

        self.socket.shutdown();
        info!("Telemetry feed ended after {} messages", self.received);
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened => {
                debug!("Telemetry socket open");
                self.request();
            }
            SocketEvent::Message(message) => {
                self.on_message(message);
                self.schedule_request();
            }
            SocketEvent::Closed { code } => {
                debug!("Telemetry socket closed (code {:?})", code);
                self.next_request = None;
            }
        }
    }

    fn on_message(&mut self, message: WireMessage) {
        let Some(text) = message.as_text() else {
            return;
        };
        match ServerTelemetryMessage::parse(text) {
            Ok(decorated) => {
                self.received += 1;
                trace!("Telemetry message {}", self.received);
                self.messages.send_replace(Some(Arc::new(decorated)));
            }
            Err(e) => warn!("Dropping malformed telemetry: {}", e),
        }
    }

    fn schedule_request(&mut self) {
        let now = Instant::now();
        match self.last_request.map(|last| last + self.poll_interval) {
            Some(earliest) if earliest > now => self.next_request = Some(earliest),
            _ => self.request(),
        }
    }

    fn request(&mut self) {
        if let Err(e) = self.socket.send(WireMessage::Text("{}".to_string())) {
            warn!("Telemetry request not sent: {}", e);
            return;
        }
        self.last_request = Some(Instant::now());
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
