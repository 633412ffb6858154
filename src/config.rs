//! Client configuration
//!
//! Loaded from YAML. Every section has defaults so an empty document is a valid
//! config that points at `ws://localhost:8080`.
//!
//! ```yaml
//! server:
//!   scheme: https
//!   host: rover.local
//! video:
//!   stream_type: h264
//!   mjpeg_quality_max: 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::connection::Endpoint;
use crate::types::StreamMode;
use crate::{Result, TeleopError};

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    pub server: Endpoint,
    pub video: VideoPreferences,
    pub camera: CameraConfig,
    pub drive: DriveConfig,
    pub telemetry: TelemetryConfig,
}

/// Operator preferences (`video.stream.type`, `mjpeg.quality.max`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoPreferences {
    pub stream_type: StreamMode,
    /// Overrides [`CameraConfig::max_quality`] when set
    pub mjpeg_quality_max: Option<u8>,
}

/// Camera channel tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub reconnect_delay_ms: u64,
    pub watchdog_ms: u64,
    pub fast_fps: u32,
    pub slow_fps: u32,
    pub min_quality: u8,
    pub max_quality: u8,
    pub initial_quality: u8,
    pub smoothing: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 250,
            watchdog_ms: 1000,
            fast_fps: 16,
            slow_fps: 4,
            min_quality: 25,
            max_quality: 50,
            initial_quality: 25,
            smoothing: 0.8,
        }
    }
}

impl CameraConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }
}

/// Drive socket tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub reconnect_delay_ms: u64,
    /// Floor between two commands when the server acknowledges instantly
    pub min_command_interval_ms: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self { reconnect_delay_ms: 100, min_command_interval_ms: 10 }
    }
}

impl DriveConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn min_command_interval(&self) -> Duration {
        Duration::from_millis(self.min_command_interval_ms)
    }
}

/// Telemetry socket tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { reconnect_delay_ms: 100, poll_interval_ms: 40 }
    }
}

impl TelemetryConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TeleopConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| TeleopError::parse("TeleopConfig deserialization", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| TeleopError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&yaml)
    }

    /// Camera settings with the operator's quality ceiling applied
    pub fn effective_camera(&self) -> CameraConfig {
        let mut camera = self.camera.clone();
        if let Some(max) = self.video.mjpeg_quality_max {
            camera.max_quality = max;
        }
        camera
    }

    /// Check the invariants the controllers rely on
    pub fn validate(&self) -> Result<()> {
        let camera = self.effective_camera();
        if camera.min_quality > camera.max_quality {
            return Err(TeleopError::config(format!(
                "min_quality {} exceeds max_quality {}",
                camera.min_quality, camera.max_quality
            )));
        }
        if camera.max_quality > 100 {
            return Err(TeleopError::config("max_quality must be at most 100"));
        }
        if !(0.0..1.0).contains(&camera.smoothing) {
            return Err(TeleopError::config("smoothing must be in [0, 1)"));
        }
        if camera.watchdog_ms == 0 {
            return Err(TeleopError::config("watchdog_ms must be non-zero"));
        }
        if camera.reconnect_delay_ms == 0
            || self.drive.reconnect_delay_ms == 0
            || self.telemetry.reconnect_delay_ms == 0
        {
            return Err(TeleopError::config("reconnect delays must be non-zero"));
        }
        if self.server.host.is_empty() {
            return Err(TeleopError::config("server host is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TeleopConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, TeleopConfig::default());
        assert_eq!(config.camera.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(config.camera.watchdog(), Duration::from_secs(1));
        assert_eq!(config.drive.reconnect_delay(), Duration::from_millis(100));
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = TeleopConfig::from_yaml_str(
            "server:\n  scheme: https\n  host: rover.local\nvideo:\n  stream_type: h264\n  mjpeg_quality_max: 60\n",
        )
        .unwrap();
        assert_eq!(config.server.host, "rover.local");
        assert_eq!(config.video.stream_type, StreamMode::H264);
        assert_eq!(config.effective_camera().max_quality, 60);
        assert_eq!(config.camera.fast_fps, 16);
    }

    #[test]
    fn quality_ceiling_below_floor_is_rejected() {
        let err = TeleopConfig::from_yaml_str("video:\n  mjpeg_quality_max: 10\n").unwrap_err();
        assert!(matches!(err, TeleopError::Config { .. }));
    }

    #[test]
    fn zero_reconnect_delay_is_rejected() {
        let err = TeleopConfig::from_yaml_str("drive:\n  reconnect_delay_ms: 0\n").unwrap_err();
        assert!(matches!(err, TeleopError::Config { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = TeleopConfig::from_yaml_str("camera: [1, 2").unwrap_err();
        assert!(matches!(err, TeleopError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = TeleopConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, TeleopError::Io { .. }));
    }
}
