//! Camera streaming: per-camera capture loops and their orchestration.
//!
//! Each camera is polled for one JPEG at a time. The [`rate::FrameRateController`]
//! paces requests and trades image quality for throughput, the
//! [`channel::CameraChannel`] owns the socket and watchdog, and the
//! [`orchestrator::CameraOrchestrator`] decides which camera gets the bandwidth.

pub mod channel;
pub mod orchestrator;
pub mod rate;

pub use channel::{CameraChannel, CameraEvent, ChannelStatus, WATCHDOG_CLOSE_CODE};
pub use orchestrator::{CameraOrchestrator, ChannelParts, RenderEvent};
pub use rate::{FrameRateController, FrameRateState};
