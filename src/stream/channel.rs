//! Camera stream channel
//!
//! One task per camera owns the camera socket, the rate controller and both timers.
//! The capture watchdog and the next-capture deadline are plain `Option<Instant>`
//! fields of that task, so "is a capture in flight" has exactly one owner and a
//! superseded timer can never fire late.
//!
//! ```text
//! capture() ──► arm watchdog (1s) ──► send {quality}
//!                     │                     │
//!            no frame │                     │ frame
//!                     ▼                     ▼
//!           close(4001) + reconnect   cancel watchdog, schedule next capture
//! ```

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::CameraConfig;
use crate::connection::{
    ConnectionState, Connector, Endpoint, FrameMode, ReconnectPolicy, ReconnectingSocket,
    SocketEvent, SocketHandle, WireMessage,
};
use crate::stream::rate::{FrameRateController, FrameRateState};
use crate::types::{CameraControlMessage, CameraPosition, CaptureRequest, StreamRate};
use crate::{Result, TeleopError};

/// Close code used when the watchdog gives up on a frame
pub const WATCHDOG_CLOSE_CODE: u16 = 4001;

/// Data forwarded to the renderer
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    /// Stream geometry, sent by the rover before frames
    Init { position: CameraPosition, width: u32, height: u32 },
    /// One JPEG image
    Frame { position: CameraPosition, jpeg: Bytes },
}

/// Channel snapshot published after every event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub position: CameraPosition,
    pub connection: ConnectionState,
    /// Whether `start` has been called without a matching `stop`
    pub socket_active: bool,
    pub rate: FrameRateState,
    /// A capture request is waiting for its frame
    pub capture_in_flight: bool,
    pub frames_received: u64,
    pub watchdog_timeouts: u64,
}

#[derive(Debug)]
enum ChannelCommand {
    Start,
    Stop,
    SetRate(StreamRate),
    Capture,
}

/// Handle on one camera channel
///
/// Dropping the handle stops the channel and its socket.
pub struct CameraChannel {
    position: CameraPosition,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    status: watch::Receiver<ChannelStatus>,
    cancel: CancellationToken,
}

impl CameraChannel {
    /// Spawn the channel task; the socket is not opened until [`CameraChannel::start`]
    pub fn spawn(
        position: CameraPosition,
        connector: Arc<dyn Connector>,
        endpoint: &Endpoint,
        config: &CameraConfig,
    ) -> (Self, mpsc::UnboundedReceiver<CameraEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let rate = FrameRateController::from_config(config);
        let (status_tx, status_rx) = watch::channel(ChannelStatus {
            position,
            connection: ConnectionState::Disconnected,
            socket_active: false,
            rate: rate.snapshot(),
            capture_in_flight: false,
            frames_received: 0,
            watchdog_timeouts: 0,
        });
        let cancel = CancellationToken::new();

        let task = ChannelTask {
            position,
            connector,
            endpoint: endpoint.clone(),
            config: config.clone(),
            rate,
            socket: None,
            socket_events: None,
            connection: ConnectionState::Disconnected,
            watchdog: None,
            next_capture: None,
            frames_received: 0,
            watchdog_timeouts: 0,
            commands: command_rx,
            events: event_tx,
            status: status_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        (Self { position, commands: command_tx, status: status_rx, cancel }, event_rx)
    }

    pub fn position(&self) -> CameraPosition {
        self.position
    }

    /// Open the camera socket; no-op if it is already open
    pub fn start(&self) -> Result<()> {
        self.command(ChannelCommand::Start)
    }

    /// Disable reconnect, cancel timers and close the socket; safe to repeat
    pub fn stop(&self) -> Result<()> {
        self.command(ChannelCommand::Stop)
    }

    pub fn set_rate(&self, rate: StreamRate) -> Result<()> {
        self.command(ChannelCommand::SetRate(rate))
    }

    /// Request one frame now, superseding any scheduled capture
    pub fn capture(&self) -> Result<()> {
        self.command(ChannelCommand::Capture)
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    fn command(&self, command: ChannelCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TeleopError::channel_closed(format!("camera {}", self.position)))
    }
}

impl Drop for CameraChannel {
    fn drop(&mut self) {
        debug!("Dropping camera channel {}", self.position);
        self.cancel.cancel();
    }
}

enum Step {
    Cancelled,
    Command(Option<ChannelCommand>),
    Socket(Option<SocketEvent>),
    WatchdogFired,
    CaptureDue,
}

struct ChannelTask {
    position: CameraPosition,
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    config: CameraConfig,
    rate: FrameRateController,
    socket: Option<SocketHandle>,
    socket_events: Option<mpsc::UnboundedReceiver<SocketEvent>>,
    connection: ConnectionState,
    watchdog: Option<Instant>,
    next_capture: Option<Instant>,
    frames_received: u64,
    watchdog_timeouts: u64,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    events: mpsc::UnboundedSender<CameraEvent>,
    status: watch::Sender<ChannelStatus>,
    cancel: CancellationToken,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_socket_event(
    events: &mut Option<mpsc::UnboundedReceiver<SocketEvent>>,
) -> Option<SocketEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

impl ChannelTask {
    async fn run(mut self) {
        info!("Camera channel {} started", self.position);

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                command = self.commands.recv() => Step::Command(command),
                event = next_socket_event(&mut self.socket_events) => Step::Socket(event),
                _ = sleep_until_deadline(self.watchdog) => Step::WatchdogFired,
                _ = sleep_until_deadline(self.next_capture) => Step::CaptureDue,
            };

            match step {
                Step::Cancelled | Step::Command(None) => break,
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Socket(Some(event)) => self.handle_socket_event(event),
                Step::Socket(None) => {
                    debug!("Socket task for camera {} ended", self.position);
                    self.socket_events = None;
                    self.connection = ConnectionState::Disconnected;
                }
                Step::WatchdogFired => self.on_watchdog(),
                Step::CaptureDue => {
                    self.next_capture = None;
                    self.capture();
                }
            }

            self.publish_status();
        }

        self.stop_socket();
        self.publish_status();
        info!("Camera channel {} ended ({} frames)", self.position, self.frames_received);
    }

    fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Start => self.start_socket(),
            ChannelCommand::Stop => self.stop_socket(),
            ChannelCommand::SetRate(rate) => self.set_rate(rate),
            ChannelCommand::Capture => self.capture(),
        }
    }

    fn start_socket(&mut self) {
        if self.socket.is_some() {
            trace!("Camera {} socket already started", self.position);
            return;
        }
        let policy = ReconnectPolicy::new(
            self.position.socket_path(),
            FrameMode::Binary,
            self.config.reconnect_delay(),
        );
        let (socket, events) =
            ReconnectingSocket::spawn(Arc::clone(&self.connector), &self.endpoint, policy);
        self.socket = Some(socket);
        self.socket_events = Some(events);
        self.connection = ConnectionState::Connecting;
        debug!("Camera {} socket started", self.position);
    }

    fn stop_socket(&mut self) {
        self.watchdog = None;
        self.next_capture = None;
        if let Some(socket) = self.socket.take() {
            socket.shutdown();
            debug!("Camera {} socket stopped", self.position);
        }
        self.socket_events = None;
        self.connection = ConnectionState::Disconnected;
    }

    fn set_rate(&mut self, rate: StreamRate) {
        let fps = match rate {
            StreamRate::Fast => self.config.fast_fps,
            StreamRate::Slow => self.config.slow_fps,
            StreamRate::Off => 0,
        };
        debug!("Camera {} rate {:?} ({} fps)", self.position, rate, fps);
        self.rate.set_target_fps(fps, Instant::now());

        if fps > 0 {
            self.capture();
        } else {
            self.next_capture = None;
            self.watchdog = None;
        }
    }

    fn capture(&mut self) {
        let now = Instant::now();
        self.next_capture = None;
        self.watchdog = Some(now + self.config.watchdog());

        let Some(socket) = self.socket.as_ref().filter(|socket| socket.is_open()) else {
            trace!("Camera {} capture deferred: socket not open", self.position);
            return;
        };
        let request = CaptureRequest { quality: self.rate.jpeg_quality() };
        if let Err(e) = socket.send_json(&request) {
            warn!("Camera {} capture request failed: {}", self.position, e);
        }
    }

    fn on_watchdog(&mut self) {
        self.watchdog = None;
        self.watchdog_timeouts += 1;
        warn!(
            "Camera {} frame timed out after {:?}, forcing reconnect",
            self.position,
            self.config.watchdog()
        );
        if let Some(socket) = &self.socket {
            if let Err(e) = socket.close(Some(WATCHDOG_CLOSE_CODE)) {
                debug!("Camera {} forced close failed: {}", self.position, e);
            }
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened => {
                self.connection = ConnectionState::Open;
                if self.rate.is_active() {
                    self.capture();
                }
            }
            SocketEvent::Closed { code } => {
                debug!("Camera {} socket closed (code {:?})", self.position, code);
                self.watchdog = None;
                self.next_capture = None;
                self.connection = if self.socket.is_some() {
                    ConnectionState::Connecting
                } else {
                    ConnectionState::Disconnected
                };
            }
            SocketEvent::Message(message) => self.on_message(message),
        }
    }

    fn on_message(&mut self, message: WireMessage) {
        let now = Instant::now();
        self.watchdog = None;
        self.frames_received += 1;

        if let Some(delay) = self.rate.on_frame_received(now) {
            self.next_capture = Some(now + delay);
        }

        match message {
            WireMessage::Binary(jpeg) => {
                trace!("Camera {} frame {} ({} bytes)", self.position, self.frames_received, jpeg.len());
                self.emit(CameraEvent::Frame { position: self.position, jpeg });
            }
            WireMessage::Text(text) => match serde_json::from_str::<CameraControlMessage>(&text) {
                Ok(CameraControlMessage::Init { width, height }) => {
                    info!("Camera {} stream is {}x{}", self.position, width, height);
                    self.emit(CameraEvent::Init { position: self.position, width, height });
                }
                Ok(CameraControlMessage::Unknown) => {
                    debug!("Camera {} ignoring control message: {}", self.position, text);
                }
                Err(e) => warn!("Camera {} dropping malformed message: {}", self.position, e),
            },
        }
    }

    fn emit(&self, event: CameraEvent) {
        if self.events.send(event).is_err() {
            trace!("Camera {} renderer is gone, dropping event", self.position);
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(ChannelStatus {
            position: self.position,
            connection: self.connection,
            socket_active: self.socket.is_some(),
            rate: self.rate.snapshot(),
            capture_in_flight: self.watchdog.is_some(),
            frames_received: self.frames_received,
            watchdog_timeouts: self.watchdog_timeouts,
        });
    }
}
