//! Core types shared by the camera, drive and telemetry channels.
//!
//! ## Overview
//!
//! - [`CameraPosition`], [`StreamRate`], [`StreamMode`] and [`Viewport`] describe which
//!   camera is streamed, how fast, and where its frames are drawn
//! - [`InputCommand`] is the sparse drive command sent on `/ws/ctl`
//! - [`ControlAuthority`] and [`ControlStatus`] track who may drive
//! - [`ServerTelemetryMessage`] is the decorated `/ws/log` payload
//!
//! ## Usage Example
//!
//! ```rust
//! use rover_teleop::types::{CameraPosition, InputCommand};
//!
//! let command = InputCommand { throttle: 0.4, button_y: true, ..InputCommand::neutral() }
//!     .with_camera_id(CameraPosition::Rear.ptz_id());
//!
//! let text = serde_json::to_string(&command).unwrap();
//! assert!(text.contains("\"button_y\":true"));
//! assert!(!text.contains("button_a"));
//! ```

mod authority;
mod camera;
mod command;
mod telemetry;

pub use authority::{Banner, ControlAuthority, ControlStatus};
pub use camera::{CameraPosition, StreamMode, StreamRate, Viewport};
pub use command::{CameraControlMessage, CaptureRequest, InputCommand, ServerAck, TakeOverRequest};
pub use telemetry::{AUTOPILOT_CONTROL_MODE, ServerTelemetryMessage};
