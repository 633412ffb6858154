//! Adaptive live-video and drive-command transport for teleoperated rovers.
//!
//! The rover exposes a handful of WebSocket endpoints: one per camera, one for drive
//! commands and one for telemetry. This crate keeps all of them alive over flaky
//! wireless links and paces them so the link is never flooded.
//!
//! # Features
//!
//! - **Self-healing sockets**: every channel reconnects on its own after any close
//! - **Adaptive MJPEG**: one frame in flight per camera, JPEG quality follows throughput
//! - **Warm background camera**: the inactive camera keeps a slow stream so switching is instant
//! - **Ack-paced driving**: one command per rover acknowledgment, never a backlog
//! - **Control authority**: operator / view-only / disconnected, from the rover's verdict
//!   and local input health
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rover_teleop::{Teleop, TeleopConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> rover_teleop::Result<()> {
//!     let config = TeleopConfig::load("teleop.yaml")?;
//!     let mut session = Teleop::connect(&config)?;
//!
//!     session.cameras.start()?;
//!     while let Some(event) = session.render_events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;
pub mod types;

// Transport and channels
pub mod connection;
pub mod drive;
pub mod stream;
pub mod telemetry;

// Operator input
pub mod input;

// Core exports
pub use config::{CameraConfig, DriveConfig, TelemetryConfig, TeleopConfig, VideoPreferences};
pub use error::*;
pub use types::*;

// Main API exports
pub use connection::{ConnectionState, Connector, Endpoint, Transport, WsConnector};
pub use drive::DriveTransport;
pub use input::{ControllerKind, InputController, InputHub, collapse};
pub use stream::{CameraChannel, CameraOrchestrator, FrameRateController, RenderEvent};
pub use telemetry::TelemetryFeed;

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

/// Everything a dashboard needs, wired together once at start-up
///
/// Components reach each other only through this object: the drive transport reads the
/// active camera from the orchestrator and commands from the shared [`InputHub`].
pub struct TeleopSession {
    pub cameras: CameraOrchestrator,
    pub render_events: mpsc::UnboundedReceiver<RenderEvent>,
    pub telemetry: TelemetryFeed,
    /// `None` for view-only sessions
    pub drive: Option<DriveTransport>,
    pub input: Arc<Mutex<InputHub>>,
}

/// Unified entry point for rover sessions.
///
/// Must be called from within a tokio runtime; every component runs as its own task.
///
/// # Examples
///
/// ## Driving session
/// ```rust,no_run
/// use rover_teleop::{Teleop, TeleopConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rover_teleop::Result<()> {
/// let session = Teleop::connect(&TeleopConfig::default())?;
/// session.cameras.start()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Watching only
/// ```rust,no_run
/// use rover_teleop::{Teleop, TeleopConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rover_teleop::Result<()> {
/// let session = Teleop::observe(&TeleopConfig::default())?;
/// assert!(session.drive.is_none());
/// # Ok(())
/// # }
/// ```
pub struct Teleop;

impl Teleop {
    /// Connect cameras, telemetry and the drive transport over real WebSockets
    ///
    /// Cameras are created stopped; call `session.cameras.start()` to stream.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Config`] if the configuration is invalid. Unreachable
    /// rovers are not an error: every socket keeps retrying in the background.
    pub fn connect(config: &TeleopConfig) -> Result<TeleopSession> {
        Self::connect_with(Arc::new(WsConnector), config, true)
    }

    /// Like [`Teleop::connect`] but without a drive socket
    pub fn observe(config: &TeleopConfig) -> Result<TeleopSession> {
        Self::connect_with(Arc::new(WsConnector), config, false)
    }

    /// Build a session on any [`Connector`]
    pub fn connect_with(
        connector: Arc<dyn Connector>,
        config: &TeleopConfig,
        drive: bool,
    ) -> Result<TeleopSession> {
        config.validate()?;
        let endpoint = &config.server;
        info!(
            "Starting {} session with {}",
            if drive { "driving" } else { "view-only" },
            endpoint.websocket_url("/")
        );

        let (cameras, render_events) = CameraOrchestrator::connect(
            Arc::clone(&connector),
            endpoint,
            &config.effective_camera(),
            config.video.stream_type,
        );
        let telemetry = TelemetryFeed::spawn(Arc::clone(&connector), endpoint, &config.telemetry);
        let input = Arc::new(Mutex::new(InputHub::default()));
        let drive = drive.then(|| {
            DriveTransport::spawn(
                connector,
                endpoint,
                &config.drive,
                Arc::clone(&input),
                Some(cameras.active_camera()),
            )
        });

        Ok(TeleopSession { cameras, render_events, telemetry, drive, input })
    }
}
