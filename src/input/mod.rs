//! Operator input devices and the commands they produce.
//!
//! Every device sits behind [`InputController`]: it is polled once per control tick,
//! reports whether it is usable, and turns its latest state into an [`InputCommand`].
//! [`InputHub`] picks the live device (gamepad or touch joystick) for the drive
//! transport.

use serde::{Deserialize, Serialize};

use crate::types::InputCommand;

pub mod gamepad;
pub mod hub;
pub mod registry;
pub mod touch;

pub use gamepad::{
    GamepadButton, GamepadDevice, GamepadInfo, GamepadMapping, GamepadSnapshot,
    StandardGamepadController, TRIGGER_REST_THRESHOLD,
};
pub use hub::{InputHub, LiveCommand};
pub use registry::{ControllerRegistry, KnownController};
pub use touch::TouchJoystickController;

/// Which kind of device is producing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    None,
    StandardGamepad,
    TouchJoystick,
}

/// A source of drive commands
pub trait InputController: Send {
    fn kind(&self) -> ControllerKind;

    /// Refresh the device state; returns whether the device is usable
    fn poll(&mut self) -> bool;

    /// Forget device state, including activation
    fn reset(&mut self);

    /// Command for the last polled state; neutral while unhealthy
    fn command(&self) -> InputCommand;

    fn is_healthy(&self) -> bool;
}

/// Dead-zone normalization
///
/// Values inside `[-dead_zone, dead_zone]` become 0, the rest is rescaled linearly so
/// the output still spans `[-1, 1]`.
pub fn collapse(value: f64, dead_zone: f64) -> f64 {
    let dead_zone = dead_zone.abs();
    let magnitude = value.abs();
    if magnitude <= dead_zone || dead_zone >= 1.0 || value.is_nan() {
        return 0.0;
    }
    let scaled = (magnitude - dead_zone) / (1.0 - dead_zone);
    (scaled * value.signum()).clamp(-1.0, 1.0)
}

/// Inert controller used when no supported device is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneController;

impl InputController for NoneController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::None
    }

    fn poll(&mut self) -> bool {
        false
    }

    fn reset(&mut self) {}

    fn command(&self) -> InputCommand {
        InputCommand::neutral()
    }

    fn is_healthy(&self) -> bool {
        false
    }
}
