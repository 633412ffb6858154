//! Reconnecting socket
//!
//! One task per logical channel owns the transport. It opens the socket, forwards
//! inbound messages as [`SocketEvent`]s, executes outbound commands from the
//! [`SocketHandle`], and after every close waits `reconnect_delay` and opens a fresh
//! socket, for as long as `attempt_reconnect` stays set.
//!
//! All disconnect causes are treated the same way: peer close, transport error, a
//! failed handshake and a deliberate [`SocketHandle::close`] all end in
//! [`SocketEvent::Closed`] followed by a retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{ConnectionState, Connector, Endpoint, FrameMode, Transport, WireMessage};
use crate::{Result, TeleopError};

/// Where to connect and how to retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub path: String,
    pub mode: FrameMode,
    pub reconnect_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(path: impl Into<String>, mode: FrameMode, reconnect_delay: Duration) -> Self {
        Self { path: path.into(), mode, reconnect_delay }
    }
}

/// Something that happened on the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A new underlying socket is open; per-connection setup goes here
    Opened,
    Message(WireMessage),
    /// The socket closed; `code` is set when this side closed with a status code
    Closed { code: Option<u16> },
}

#[derive(Debug)]
enum SocketCommand {
    Send(WireMessage),
    Close(Option<u16>),
}

/// Owner's handle on a reconnecting socket
///
/// Dropping the handle stops the socket task.
pub struct SocketHandle {
    path: String,
    commands: mpsc::UnboundedSender<SocketCommand>,
    attempt_reconnect: Arc<AtomicBool>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl SocketHandle {
    /// Queue a message; dropped with a trace if the socket is not open when it is sent
    pub fn send(&self, message: WireMessage) -> Result<()> {
        self.commands
            .send(SocketCommand::Send(message))
            .map_err(|_| TeleopError::channel_closed(format!("socket {}", self.path)))
    }

    /// Serialize and queue a JSON text message
    pub fn send_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.send(WireMessage::json(value)?)
    }

    /// Close the current socket; a new one follows if reconnect is still enabled
    pub fn close(&self, code: Option<u16>) -> Result<()> {
        self.commands
            .send(SocketCommand::Close(code))
            .map_err(|_| TeleopError::channel_closed(format!("socket {}", self.path)))
    }

    /// Disable reconnect and close; the task ends once the socket is down
    pub fn shutdown(&self) {
        self.set_reconnect(false);
        let _ = self.commands.send(SocketCommand::Close(None));
    }

    pub fn set_reconnect(&self, enabled: bool) {
        self.attempt_reconnect.store(enabled, Ordering::SeqCst);
    }

    /// Whether a close will be followed by a new socket
    pub fn is_reconnect(&self) -> bool {
        self.attempt_reconnect.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow() == ConnectionState::Open
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        debug!("Dropping socket handle for {}", self.path);
        self.cancel.cancel();
    }
}

/// Spawns reconnecting socket tasks
pub struct ReconnectingSocket {
    connector: Arc<dyn Connector>,
    url: String,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    events: mpsc::UnboundedSender<SocketEvent>,
    attempt_reconnect: Arc<AtomicBool>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

enum Step {
    Cancelled,
    Command(Option<SocketCommand>),
    Inbound(Option<Result<WireMessage>>),
}

impl ReconnectingSocket {
    /// Spawn the socket task and connect immediately
    ///
    /// Returns the handle plus the receiver of socket events. The first event is
    /// either [`SocketEvent::Opened`] or [`SocketEvent::Closed`] if the handshake fails.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        endpoint: &Endpoint,
        policy: ReconnectPolicy,
    ) -> (SocketHandle, mpsc::UnboundedReceiver<SocketEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let attempt_reconnect = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let handle = SocketHandle {
            path: policy.path.clone(),
            commands: command_tx,
            attempt_reconnect: Arc::clone(&attempt_reconnect),
            state: state_rx,
            cancel: cancel.clone(),
        };

        let socket = Self {
            connector,
            url: endpoint.websocket_url(&policy.path),
            policy,
            commands: command_rx,
            events: event_tx,
            attempt_reconnect,
            state: state_tx,
            cancel,
        };
        tokio::spawn(socket.run());

        (handle, event_rx)
    }

    async fn run(mut self) {
        info!("Socket task for {} started", self.url);
        let mut connections = 0u64;

        loop {
            self.state.send_replace(ConnectionState::Connecting);
            debug!("Connecting to {}", self.url);

            let code = match self.connect().await {
                None => break,
                Some(Ok(transport)) => {
                    connections += 1;
                    info!("Connected to {} (connection #{})", self.url, connections);
                    self.state.send_replace(ConnectionState::Open);
                    if !self.emit(SocketEvent::Opened) {
                        break;
                    }
                    match self.pump(transport).await {
                        Some(code) => code,
                        None => break,
                    }
                }
                Some(Err(e)) => {
                    warn!("Connection to {} failed: {}", self.url, e);
                    None
                }
            };

            self.state.send_replace(ConnectionState::Disconnected);
            if !self.emit(SocketEvent::Closed { code }) {
                break;
            }

            if !self.attempt_reconnect.load(Ordering::SeqCst) {
                debug!("Reconnect disabled for {}", self.url);
                break;
            }
            if !self.wait_reconnect_delay().await {
                break;
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        info!("Socket task for {} ended after {} connections", self.url, connections);
    }

    /// Race the handshake against cancellation and commands.
    ///
    /// Returns `None` when the task should stop.
    async fn connect(&mut self) -> Option<Result<Box<dyn Transport>>> {
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let connecting = connector.connect(&url);
        tokio::pin!(connecting);

        loop {
            let command = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = &mut connecting => return Some(result),
                command = self.commands.recv() => command,
            };
            if self.discard_while_closed(command) {
                return None;
            }
        }
    }

    /// Sleep for the reconnect delay; returns `false` when the task should stop
    async fn wait_reconnect_delay(&mut self) -> bool {
        trace!("Reconnecting to {} in {:?}", self.url, self.policy.reconnect_delay);
        let delay = tokio::time::sleep(self.policy.reconnect_delay);
        tokio::pin!(delay);

        loop {
            let command = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut delay => return true,
                command = self.commands.recv() => command,
            };
            if self.discard_while_closed(command) {
                return false;
            }
        }
    }

    /// Commands that arrive with no open socket are dropped. A close with reconnect
    /// disabled, or every handle gone, ends the task.
    fn discard_while_closed(&self, command: Option<SocketCommand>) -> bool {
        match command {
            None => true,
            Some(SocketCommand::Close(_)) => !self.attempt_reconnect.load(Ordering::SeqCst),
            Some(SocketCommand::Send(_)) => {
                trace!("Dropping message for {}: socket not open", self.url);
                false
            }
        }
    }

    /// Shuttle messages until the socket closes.
    ///
    /// Returns `Some(code)` for a close that may be retried, `None` to stop the task.
    async fn pump(&mut self, mut transport: Box<dyn Transport>) -> Option<Option<u16>> {
        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                command = self.commands.recv() => Step::Command(command),
                inbound = transport.recv() => Step::Inbound(inbound),
            };

            match step {
                Step::Cancelled | Step::Command(None) => {
                    if let Err(e) = transport.close(None).await {
                        debug!("Close of {} during shutdown failed: {}", self.url, e);
                    }
                    return None;
                }
                Step::Command(Some(SocketCommand::Send(message))) => {
                    if let Err(e) = transport.send(message).await {
                        warn!("Send on {} failed: {}", self.url, e);
                        return Some(None);
                    }
                }
                Step::Command(Some(SocketCommand::Close(code))) => {
                    debug!("Closing {} (code {:?})", self.url, code);
                    if let Err(e) = transport.close(code).await {
                        debug!("Close of {} failed: {}", self.url, e);
                    }
                    return Some(code);
                }
                Step::Inbound(Some(Ok(message))) => {
                    let message = self.policy.mode.decode(message);
                    if !self.emit(SocketEvent::Message(message)) {
                        return None;
                    }
                }
                Step::Inbound(Some(Err(e))) => {
                    warn!("Receive on {} failed: {}", self.url, e);
                    return Some(None);
                }
                Step::Inbound(None) => {
                    debug!("Peer closed {}", self.url);
                    return Some(None);
                }
            }
        }
    }

    /// Forward an event to the owner; `false` once the owner is gone
    fn emit(&self, event: SocketEvent) -> bool {
        if self.events.send(event).is_err() {
            debug!("Event receiver for {} dropped, shutting down", self.url);
            return false;
        }
        true
    }
}
