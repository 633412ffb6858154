//! Camera identity and stream rate selection

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical camera on the rover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    Rear,
}

impl CameraPosition {
    /// Both cameras, front first
    pub const ALL: [CameraPosition; 2] = [CameraPosition::Front, CameraPosition::Rear];

    /// Name used in socket paths and logs
    pub fn as_str(self) -> &'static str {
        match self {
            CameraPosition::Front => "front",
            CameraPosition::Rear => "rear",
        }
    }

    /// The camera that is not this one
    pub fn other(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Rear,
            CameraPosition::Rear => CameraPosition::Front,
        }
    }

    /// WebSocket path of this camera's MJPEG stream
    pub fn socket_path(self) -> String {
        format!("/ws/cam/{}", self.as_str())
    }

    /// PTZ routing id carried in drive commands
    pub fn ptz_id(self) -> i8 {
        match self {
            CameraPosition::Front => 0,
            CameraPosition::Rear => 1,
        }
    }
}

impl fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested capture rate of one camera channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum StreamRate {
    /// Full rate, used for the camera the operator is watching
    Fast,
    /// Preview rate that keeps a background camera warm
    Slow,
    /// Capture loop suspended, socket stays open
    Off,
}

/// How the main viewport is fed (`video.stream.type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Frames are polled one JPEG at a time
    #[default]
    Mjpeg,
    /// An external H.264 player feeds the main viewport
    H264,
}

impl StreamMode {
    /// Whether the main viewport relies on the MJPEG capture loop
    pub fn is_frame_polling(self) -> bool {
        matches!(self, StreamMode::Mjpeg)
    }
}

/// Render target of a camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    Main,
    Preview,
}
