//! Drive command transport
//!
//! Commands go out on `/ws/ctl` one at a time: once when the socket opens and then once
//! per acknowledgment from the rover. A slow rover therefore slows the command rate
//! instead of building a backlog. Each acknowledgment also says whether this client
//! holds control, which together with the health of the local input device decides
//! the [`ControlAuthority`].

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::DriveConfig;
use crate::connection::{
    ConnectionState, Connector, Endpoint, FrameMode, ReconnectPolicy, ReconnectingSocket,
    SocketEvent, SocketHandle, WireMessage,
};
use crate::input::InputHub;
use crate::types::{CameraPosition, ControlAuthority, ControlStatus, ServerAck, TakeOverRequest};
use crate::{Result, TeleopError};

/// Server path of the drive socket
pub const DRIVE_PATH: &str = "/ws/ctl";

/// `camera_id` sent when no camera context is attached
pub const NO_CAMERA_ID: i8 = -1;

#[derive(Debug)]
enum DriveCommand {
    TakeOver,
}

/// Handle on the drive transport; dropping it closes the drive socket
pub struct DriveTransport {
    commands: mpsc::UnboundedSender<DriveCommand>,
    status: watch::Receiver<ControlStatus>,
    connection: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl DriveTransport {
    /// Connect to `/ws/ctl` and start the send cycle
    ///
    /// `active_camera` routes PTZ commands; without it every command carries
    /// `camera_id: -1`.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        endpoint: &Endpoint,
        config: &DriveConfig,
        hub: Arc<Mutex<InputHub>>,
        active_camera: Option<watch::Receiver<CameraPosition>>,
    ) -> Self {
        let policy = ReconnectPolicy::new(DRIVE_PATH, FrameMode::Text, config.reconnect_delay());
        let (socket, socket_events) = ReconnectingSocket::spawn(connector, endpoint, policy);
        let connection = socket.state();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ControlStatus::default());
        let cancel = CancellationToken::new();

        let task = DriveTask {
            socket,
            socket_events,
            hub,
            active_camera,
            min_interval: config.min_command_interval(),
            status: ControlStatus::default(),
            pending_grant: None,
            next_send: None,
            last_send: None,
            commands: command_rx,
            status_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Self { commands: command_tx, status: status_rx, connection, cancel }
    }

    /// Ask the rover to hand control to this client, outside the normal cycle
    pub fn request_take_over_control(&self) -> Result<()> {
        self.commands
            .send(DriveCommand::TakeOver)
            .map_err(|_| TeleopError::channel_closed("drive transport"))
    }

    pub fn status(&self) -> ControlStatus {
        self.status.borrow().clone()
    }

    pub fn authority(&self) -> ControlAuthority {
        self.status.borrow().authority
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ControlStatus> {
        self.status.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }
}

impl Drop for DriveTransport {
    fn drop(&mut self) {
        debug!("Dropping drive transport");
        self.cancel.cancel();
    }
}

enum Step {
    Cancelled,
    Command(Option<DriveCommand>),
    Socket(Option<SocketEvent>),
    SendDue,
}

struct DriveTask {
    socket: SocketHandle,
    socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    hub: Arc<Mutex<InputHub>>,
    active_camera: Option<watch::Receiver<CameraPosition>>,
    min_interval: std::time::Duration,
    status: ControlStatus,
    /// Grant carried by the last acknowledgment, applied on the next send
    pending_grant: Option<bool>,
    next_send: Option<Instant>,
    last_send: Option<Instant>,
    commands: mpsc::UnboundedReceiver<DriveCommand>,
    status_tx: watch::Sender<ControlStatus>,
    cancel: CancellationToken,
}

impl DriveTask {
    async fn run(mut self) {
        info!("Drive transport started");

        loop {
            let next_send = self.next_send;
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                command = self.commands.recv() => Step::Command(command),
                event = self.socket_events.recv() => Step::Socket(event),
                _ = sleep_until_deadline(next_send) => Step::SendDue,
            };

            match step {
                Step::Cancelled | Step::Command(None) | Step::Socket(None) => break,
                Step::Command(Some(DriveCommand::TakeOver)) => self.take_over(),
                Step::Socket(Some(event)) => self.handle_socket_event(event).await,
                Step::SendDue => {
                    self.next_send = None;
                    self.send_command().await;
                }
            }
            self.publish();
        }

        self.socket.shutdown();
        self.status.authority = ControlAuthority::Disconnected;
        self.publish();
        info!("Drive transport ended after {} commands", self.status.commands_sent);
    }

    async fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened => {
                info!("Drive socket open");
                self.status.authority = ControlAuthority::OperatorViewOnly;
                self.status.server_control = None;
                self.pending_grant = None;
                self.schedule_send().await;
            }
            SocketEvent::Message(message) => {
                self.on_ack(message);
                self.schedule_send().await;
            }
            SocketEvent::Closed { code } => {
                warn!("Drive socket closed (code {:?})", code);
                self.status.authority = ControlAuthority::Disconnected;
                self.pending_grant = None;
                self.next_send = None;
            }
        }
    }

    fn on_ack(&mut self, message: WireMessage) {
        match parse_ack(&message) {
            Ok(ack) => {
                trace!("Drive ack: {:?}", ack.control);
                self.pending_grant = Some(ack.grants_operator());
                self.status.server_control = ack.control;
            }
            Err(e) => warn!("Malformed drive acknowledgment, keeping authority: {}", e),
        }
    }

    /// Send now, or once the minimum command interval has passed
    async fn schedule_send(&mut self) {
        let now = Instant::now();
        match self.last_send.map(|last| last + self.min_interval) {
            Some(earliest) if earliest > now => {
                trace!("Deferring drive command by {:?}", earliest - now);
                self.next_send = Some(earliest);
            }
            _ => self.send_command().await,
        }
    }

    async fn send_command(&mut self) {
        let live = self.hub.lock().await.next_command();
        let camera_id = self
            .active_camera
            .as_ref()
            .map(|camera| camera.borrow().ptz_id())
            .unwrap_or(NO_CAMERA_ID);
        let command = live.command.with_camera_id(camera_id);

        if let Err(e) = self.socket.send_json(&command) {
            warn!("Drive command not sent: {}", e);
            return;
        }
        self.last_send = Some(Instant::now());
        self.status.commands_sent += 1;

        if self.status.controller_healthy != live.healthy {
            info!("Input device {:?} healthy: {}", live.source, live.healthy);
        }
        self.status.controller_healthy = live.healthy;
        if let Some(granted) = self.pending_grant.take() {
            self.status.authority = ControlAuthority::resolve(granted, live.healthy);
        }
    }

    fn take_over(&self) {
        info!("Requesting drive control");
        if let Err(e) = self.socket.send_json(&TakeOverRequest::force()) {
            warn!("Take-over request not sent: {}", e);
        }
    }

    fn publish(&self) {
        self.status_tx.send_if_modified(|current| {
            if *current == self.status {
                false
            } else {
                *current = self.status.clone();
                true
            }
        });
    }
}

fn parse_ack(message: &WireMessage) -> Result<ServerAck> {
    let text = message
        .as_text()
        .ok_or_else(|| TeleopError::protocol(DRIVE_PATH, "binary acknowledgment"))?;
    Ok(serde_json::from_str(text)?)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::GamepadSnapshot;
    use crate::test_utils::{MockConnector, MockPeer, MockServer, SharedGamepad};
    use crate::types::Banner;
    use serde_json::json;
    use std::time::Duration;

    const PAD_ID: &str = "Xbox 360 Controller (XInput STANDARD GAMEPAD Vendor: 045e Product: 028e)";

    struct Rig {
        drive: DriveTransport,
        pad: SharedGamepad,
        server: MockServer,
        connector: Arc<MockConnector>,
    }

    fn rig(camera: Option<watch::Receiver<CameraPosition>>) -> Rig {
        let pad = SharedGamepad::new(GamepadSnapshot::standard(PAD_ID));
        let mut hub = InputHub::default();
        hub.gamepad_connected(PAD_ID, Box::new(pad.clone()));

        let (connector, server) = MockConnector::new();
        let drive = DriveTransport::spawn(
            connector.clone(),
            &Endpoint::default(),
            &DriveConfig::default(),
            Arc::new(Mutex::new(hub)),
            camera,
        );
        Rig { drive, pad, server, connector }
    }

    async fn wait_authority(drive: &DriveTransport, authority: ControlAuthority) -> ControlStatus {
        let mut status = drive.subscribe_status();
        let status = status.wait_for(|s| s.authority == authority).await.expect("drive alive");
        status.clone()
    }

    async fn ack(peer: &mut MockPeer, control: &str) -> serde_json::Value {
        peer.send_json(&json!({"control": control}));
        peer.expect_json().await
    }

    #[test]
    fn binary_ack_is_a_protocol_error() {
        let binary = WireMessage::Binary(bytes::Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(parse_ack(&binary), Err(TeleopError::Protocol { .. })));
        assert!(matches!(
            parse_ack(&WireMessage::Text("{{{".into())),
            Err(TeleopError::Parse { .. })
        ));
        let ack = parse_ack(&WireMessage::Text(r#"{"control":"operator"}"#.into())).unwrap();
        assert!(ack.grants_operator());
    }

    #[tokio::test(start_paused = true)]
    async fn first_command_is_sent_on_open() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept_path(DRIVE_PATH).await;

        let command = peer.expect_json().await;
        assert_eq!(
            command,
            json!({"steering": 0.0, "throttle": 0.0, "pan": 0.0, "tilt": 0.0, "camera_id": -1})
        );
        assert_eq!(rig.drive.connection_state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_paced_by_acknowledgments() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(peer.drain().is_empty(), "no command without an ack");

        rig.pad.set(GamepadSnapshot::standard(PAD_ID).with_button(7, 1.0).with_button(0, 1.0));
        let command = ack(&mut peer, "operator").await;
        assert_eq!(command["throttle"], json!(1.0));
        assert_eq!(command["button_a"], json!(true));

        let status = wait_authority(&rig.drive, ControlAuthority::OperatorActive).await;
        assert!(status.controller_healthy);
        assert_eq!(status.commands_sent, 2);
        assert_eq!(status.banner(), Banner::None);
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_ack_means_view_only_even_with_a_healthy_pad() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;
        ack(&mut peer, "operator").await;
        wait_authority(&rig.drive, ControlAuthority::OperatorActive).await;

        ack(&mut peer, "viewer").await;
        let status = wait_authority(&rig.drive, ControlAuthority::OperatorViewOnly).await;
        assert!(status.controller_healthy);
        assert_eq!(status.server_control.as_deref(), Some("viewer"));
        assert_eq!(status.banner(), Banner::ViewOnly);
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_pad_blocks_operator_authority() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;

        rig.pad.disconnect();
        ack(&mut peer, "operator").await;
        let status = rig.drive.status();
        assert_eq!(status.commands_sent, 2);
        assert_eq!(status.authority, ControlAuthority::OperatorViewOnly);
        assert!(!status.controller_healthy);
        assert_eq!(status.banner(), Banner::ControllerNotDetected);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_ack_keeps_authority_and_the_cycle_going() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;
        ack(&mut peer, "operator").await;
        wait_authority(&rig.drive, ControlAuthority::OperatorActive).await;

        peer.send_text("{{{");
        peer.expect_json().await;
        peer.send_text("[1]");
        peer.expect_json().await;
        assert_eq!(rig.drive.authority(), ControlAuthority::OperatorActive);
        assert_eq!(rig.drive.status().commands_sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_ack_still_triggers_the_next_command() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;
        ack(&mut peer, "operator").await;
        wait_authority(&rig.drive, ControlAuthority::OperatorActive).await;

        peer.send_binary(bytes::Bytes::from_static(&[0xff, 0xfe]));
        peer.expect_json().await;
        assert_eq!(rig.drive.authority(), ControlAuthority::OperatorActive);

        ack(&mut peer, "operator").await;
        assert_eq!(rig.drive.status().commands_sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn instant_acks_respect_the_minimum_interval() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;
        let first = Instant::now();

        ack(&mut peer, "operator").await;
        let second = Instant::now();
        ack(&mut peer, "operator").await;
        let third = Instant::now();

        assert!(second - first >= Duration::from_millis(10));
        assert!(third - second >= Duration::from_millis(10));
        assert!(third - second < Duration::from_millis(11));
    }

    #[tokio::test(start_paused = true)]
    async fn take_over_sends_the_force_sentinel() {
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;

        rig.drive.request_take_over_control().unwrap();
        assert_eq!(peer.expect_json().await, json!({"_operator": "force"}));
        // Out of cycle: no drive command follows on its own
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(peer.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_means_disconnected_until_the_rover_is_back() {
        let _ = tracing_subscriber::fmt::try_init();
        let mut rig = rig(None);
        let mut peer = rig.server.accept().await;
        peer.expect_json().await;
        ack(&mut peer, "operator").await;
        wait_authority(&rig.drive, ControlAuthority::OperatorActive).await;

        peer.disconnect();
        let status = wait_authority(&rig.drive, ControlAuthority::Disconnected).await;
        assert_eq!(status.banner(), Banner::ConnectionLost);
        let closed_at = Instant::now();

        let mut again = rig.server.accept().await;
        assert!(closed_at.elapsed() <= Duration::from_millis(100));
        again.expect_json().await;
        assert_eq!(rig.connector.attempts(), 2);
        ack(&mut again, "operator").await;
        wait_authority(&rig.drive, ControlAuthority::OperatorActive).await;
    }

    #[tokio::test(start_paused = true)]
    async fn camera_id_follows_the_active_camera() {
        let (camera_tx, camera_rx) = watch::channel(CameraPosition::Front);
        let mut rig = rig(Some(camera_rx));
        let mut peer = rig.server.accept().await;
        assert_eq!(peer.expect_json().await["camera_id"], json!(0));

        camera_tx.send_replace(CameraPosition::Rear);
        assert_eq!(ack(&mut peer, "operator").await["camera_id"], json!(1));
    }
}
