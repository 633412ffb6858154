//! Dual-camera orchestration
//!
//! The active camera streams fast into the main viewport while the other keeps a warm
//! slow stream into the preview, so switching cameras never waits on a cold socket.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::Result;
use crate::config::CameraConfig;
use crate::connection::{Connector, Endpoint};
use crate::stream::channel::{CameraChannel, CameraEvent};
use crate::types::{CameraPosition, StreamMode, StreamRate, Viewport};

/// What the renderer should draw
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// Size the viewport for this camera's stream
    Resize { position: CameraPosition, viewport: Viewport, width: u32, height: u32 },
    Frame { position: CameraPosition, viewport: Viewport, jpeg: bytes::Bytes },
    ActiveCameraChanged(CameraPosition),
}

/// A channel together with its event stream, as returned by [`CameraChannel::spawn`]
pub type ChannelParts = (CameraChannel, mpsc::UnboundedReceiver<CameraEvent>);

/// Owns both camera channels and routes their output to viewports
pub struct CameraOrchestrator {
    front: CameraChannel,
    rear: CameraChannel,
    mode: StreamMode,
    active: watch::Sender<CameraPosition>,
    render: mpsc::UnboundedSender<RenderEvent>,
    cancel: CancellationToken,
}

impl CameraOrchestrator {
    /// Take ownership of both channels and start routing their events
    ///
    /// The front camera starts out active. Sockets are opened by [`CameraOrchestrator::start`].
    pub fn spawn(
        front: ChannelParts,
        rear: ChannelParts,
        mode: StreamMode,
    ) -> (Self, mpsc::UnboundedReceiver<RenderEvent>) {
        let (front, front_events) = front;
        let (rear, rear_events) = rear;
        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let (active_tx, active_rx) = watch::channel(CameraPosition::Front);
        let cancel = CancellationToken::new();

        tokio::spawn(route_events(
            front_events,
            rear_events,
            active_rx,
            render_tx.clone(),
            cancel.clone(),
        ));

        let orchestrator =
            Self { front, rear, mode, active: active_tx, render: render_tx, cancel };
        (orchestrator, render_rx)
    }

    /// Spawn both channels on one connector and hand them to a new orchestrator
    pub fn connect(
        connector: Arc<dyn Connector>,
        endpoint: &Endpoint,
        config: &CameraConfig,
        mode: StreamMode,
    ) -> (Self, mpsc::UnboundedReceiver<RenderEvent>) {
        let front =
            CameraChannel::spawn(CameraPosition::Front, Arc::clone(&connector), endpoint, config);
        let rear = CameraChannel::spawn(CameraPosition::Rear, connector, endpoint, config);
        Self::spawn(front, rear, mode)
    }

    /// Open both sockets and apply frame rates
    pub fn start(&self) -> Result<()> {
        self.front.start()?;
        self.rear.start()?;
        self.apply_frame_rates()
    }

    /// Close both sockets; safe to repeat
    pub fn stop(&self) -> Result<()> {
        self.front.stop()?;
        self.rear.stop()
    }

    /// Swap the active camera and re-apply frame rates; returns the new active camera
    pub fn toggle_active_camera(&self) -> Result<CameraPosition> {
        let next = self.active_position().other();
        self.active.send_replace(next);
        info!("Active camera is now {}", next);
        if self.render.send(RenderEvent::ActiveCameraChanged(next)).is_err() {
            trace!("Renderer is gone, not announcing camera change");
        }
        self.apply_frame_rates()?;
        Ok(next)
    }

    /// Switch between MJPEG polling and an external H.264 player
    pub fn set_stream_mode(&mut self, mode: StreamMode) -> Result<()> {
        if self.mode == mode {
            return Ok(());
        }
        debug!("Stream mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.apply_frame_rates()
    }

    /// Active is fast (or off when frames are not polled), the other one slow
    fn apply_frame_rates(&self) -> Result<()> {
        let active = self.active_position();
        let active_rate =
            if self.mode.is_frame_polling() { StreamRate::Fast } else { StreamRate::Off };
        self.channel(active).set_rate(active_rate)?;
        self.channel(active.other()).set_rate(StreamRate::Slow)
    }

    pub fn stream_mode(&self) -> StreamMode {
        self.mode
    }

    pub fn active_position(&self) -> CameraPosition {
        *self.active.borrow()
    }

    /// Watch the active camera, for PTZ routing
    pub fn active_camera(&self) -> watch::Receiver<CameraPosition> {
        self.active.subscribe()
    }

    pub fn channel(&self, position: CameraPosition) -> &CameraChannel {
        match position {
            CameraPosition::Front => &self.front,
            CameraPosition::Rear => &self.rear,
        }
    }
}

impl Drop for CameraOrchestrator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn viewport_for(position: CameraPosition, active: &watch::Receiver<CameraPosition>) -> Viewport {
    if *active.borrow() == position { Viewport::Main } else { Viewport::Preview }
}

async fn route_events(
    mut front: mpsc::UnboundedReceiver<CameraEvent>,
    mut rear: mpsc::UnboundedReceiver<CameraEvent>,
    active: watch::Receiver<CameraPosition>,
    render: mpsc::UnboundedSender<RenderEvent>,
    cancel: CancellationToken,
) {
    let mut front_open = true;
    let mut rear_open = true;

    while front_open || rear_open {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = front.recv(), if front_open => match event {
                Some(event) => event,
                None => { front_open = false; continue; }
            },
            event = rear.recv(), if rear_open => match event {
                Some(event) => event,
                None => { rear_open = false; continue; }
            },
        };

        let render_event = match event {
            CameraEvent::Init { position, width, height } => RenderEvent::Resize {
                position,
                viewport: viewport_for(position, &active),
                width,
                height,
            },
            CameraEvent::Frame { position, jpeg } => RenderEvent::Frame {
                position,
                viewport: viewport_for(position, &active),
                jpeg,
            },
        };
        if render.send(render_event).is_err() {
            debug!("Renderer dropped, stopping camera event routing");
            break;
        }
    }
}
