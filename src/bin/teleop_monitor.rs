//! Watch a rover from the terminal
//!
//! Streams both cameras and the telemetry feed, and logs throughput once per second.
//! Never opens the drive socket.
//!
//! ```text
//! RUST_LOG=info teleop-monitor [config.yaml]
//! ```

use anyhow::{Context, Result};
use rover_teleop::stream::ChannelStatus;
use rover_teleop::types::{CameraPosition, Viewport};
use rover_teleop::{RenderEvent, Teleop, TeleopConfig};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Seconds between status lines
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// How often the camera in the main viewport swaps, `0` to never swap
const TOGGLE_EVERY_REPORTS: u32 = 10;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match std::env::args().nth(1) {
        Some(path) => TeleopConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => TeleopConfig::default(),
    };
    info!("Monitoring {}", config.server.websocket_url("/"));

    let mut session = Teleop::observe(&config)?;
    session.cameras.start()?;

    let mut frames: HashMap<(CameraPosition, Viewport), u64> = HashMap::new();
    let mut report = tokio::time::interval(REPORT_INTERVAL);
    let mut reports = 0u32;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = session.render_events.recv() => match event {
                Some(RenderEvent::Frame { position, viewport, .. }) => {
                    *frames.entry((position, viewport)).or_default() += 1;
                }
                Some(RenderEvent::Resize { position, width, height, .. }) => {
                    info!("{} camera streams {}x{}", position, width, height);
                }
                Some(RenderEvent::ActiveCameraChanged(position)) => {
                    info!("Main viewport shows the {} camera", position);
                }
                None => {
                    warn!("Camera routing stopped");
                    break;
                }
            },
            _ = report.tick() => {
                for position in CameraPosition::ALL {
                    log_channel(&session.cameras.channel(position).status());
                }
                if let Some(telemetry) = session.telemetry.latest() {
                    info!(
                        "telemetry: heading {} autopilot {} clear passage {}",
                        telemetry.heading_text(),
                        telemetry.is_on_autopilot(),
                        telemetry.has_clear_passage()
                    );
                }
                if !frames.is_empty() {
                    info!("frames drawn: {:?}", frames);
                    frames.clear();
                }

                reports += 1;
                if TOGGLE_EVERY_REPORTS > 0 && reports % TOGGLE_EVERY_REPORTS == 0 {
                    session.cameras.toggle_active_camera()?;
                }
            }
        }
    }

    info!("Shutting down");
    session.cameras.stop()?;
    Ok(())
}

fn log_channel(status: &ChannelStatus) {
    info!(
        "{} camera: {:?} {}/{} fps q{} frames {} timeouts {}",
        status.position,
        status.connection,
        status.rate.actual_fps,
        status.rate.target_fps,
        status.rate.jpeg_quality,
        status.frames_received,
        status.watchdog_timeouts
    );
}
