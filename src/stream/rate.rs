//! Adaptive frame rate and JPEG quality
//!
//! Quality follows throughput: when frames arrive slower than the target rate the
//! requested JPEG quality drops one step per frame, when they arrive faster it rises
//! one step, always inside `[min_quality, max_quality]`. No bandwidth measurement is
//! needed; the round-trip time of each capture is the only signal.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CameraConfig;

/// Snapshot of a controller, for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FrameRateState {
    pub target_fps: u32,
    pub actual_fps: u32,
    pub jpeg_quality: u8,
    pub min_quality: u8,
    pub max_quality: u8,
    pub smoothing_factor: f64,
}

/// Per-camera rate and quality controller
///
/// Methods take the current instant so tests can drive it with synthetic time.
#[derive(Debug, Clone)]
pub struct FrameRateController {
    target_fps: u32,
    actual_fps: u32,
    jpeg_quality: u8,
    min_quality: u8,
    max_quality: u8,
    smoothing: f64,
    /// Smoothed inter-frame duration in milliseconds
    duration_ms: f64,
    target_interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl FrameRateController {
    /// Controller with the given quality bounds; `initial` is clamped into them
    ///
    /// `max < min` is treated as `max == min`.
    pub fn new(min_quality: u8, max_quality: u8, initial: u8, smoothing: f64) -> Self {
        let max_quality = max_quality.max(min_quality);
        Self {
            target_fps: 0,
            actual_fps: 0,
            jpeg_quality: initial.clamp(min_quality, max_quality),
            min_quality,
            max_quality,
            smoothing: smoothing.clamp(0.0, 1.0),
            duration_ms: 0.0,
            target_interval: None,
            last_frame: None,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(config.min_quality, config.max_quality, config.initial_quality, config.smoothing)
    }

    /// Set the target rate and assume it is met until frames say otherwise
    pub fn set_target_fps(&mut self, fps: u32, now: Instant) {
        self.target_fps = fps;
        self.actual_fps = fps;
        if fps > 0 {
            let interval = Duration::from_secs_f64(1.0 / fps as f64);
            self.duration_ms = interval.as_secs_f64() * 1000.0;
            self.target_interval = Some(interval);
        } else {
            self.target_interval = None;
        }
        self.last_frame = Some(now);
    }

    /// Account for one inbound frame
    ///
    /// Returns how long to wait before the next capture, or `None` while the target
    /// rate is zero and the capture loop should stay suspended.
    pub fn on_frame_received(&mut self, now: Instant) -> Option<Duration> {
        let elapsed_ms = match self.last_frame {
            Some(previous) => now.saturating_duration_since(previous).as_secs_f64() * 1000.0,
            None => self.duration_ms,
        };
        self.last_frame = Some(now);

        let alpha = self.smoothing;
        self.duration_ms = alpha * self.duration_ms + (1.0 - alpha) * elapsed_ms;
        if self.duration_ms > 0.0 {
            self.actual_fps = (1000.0 / self.duration_ms).round() as u32;
        }

        let step = (self.actual_fps as i64 - self.target_fps as i64).clamp(-1, 1);
        let quality = (self.jpeg_quality as i64 + step)
            .clamp(self.min_quality as i64, self.max_quality as i64);
        self.jpeg_quality = quality as u8;

        self.target_interval.map(|interval| {
            interval.saturating_sub(Duration::from_secs_f64(self.duration_ms / 1000.0))
        })
    }

    /// Change the quality ceiling, pulling the current quality down if needed
    pub fn set_max_quality(&mut self, max_quality: u8) -> crate::Result<()> {
        if max_quality < self.min_quality {
            return Err(crate::TeleopError::config(format!(
                "max quality {} is below min quality {}",
                max_quality, self.min_quality
            )));
        }
        self.max_quality = max_quality;
        self.jpeg_quality = self.jpeg_quality.min(max_quality);
        Ok(())
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn actual_fps(&self) -> u32 {
        self.actual_fps
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Whether a capture loop should be running
    pub fn is_active(&self) -> bool {
        self.target_fps > 0
    }

    pub fn snapshot(&self) -> FrameRateState {
        FrameRateState {
            target_fps: self.target_fps,
            actual_fps: self.actual_fps,
            jpeg_quality: self.jpeg_quality,
            min_quality: self.min_quality,
            max_quality: self.max_quality,
            smoothing_factor: self.smoothing,
        }
    }
}
