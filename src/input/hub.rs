//! Live command selection
//!
//! [`InputHub`] is the single place that knows which device is driving. The drive
//! transport asks it for one command per send cycle.

use serde::Serialize;
use tracing::{debug, info};

use super::registry::ControllerRegistry;
use super::touch::TouchJoystickController;
use super::{ControllerKind, GamepadDevice, InputController, NoneController};
use crate::types::InputCommand;

/// Command for one send cycle and the health of the device that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveCommand {
    pub command: InputCommand,
    pub healthy: bool,
    pub source: ControllerKind,
}

/// Owns the connected gamepad, the touch joystick and the routing between them
pub struct InputHub {
    registry: ControllerRegistry,
    gamepad: Box<dyn InputController>,
    touch: TouchJoystickController,
    mobile_active: bool,
    mobile_buffer: Option<InputCommand>,
    drive_view_visible: bool,
}

impl Default for InputHub {
    fn default() -> Self {
        Self::new(ControllerRegistry::default())
    }
}

impl InputHub {
    pub fn new(registry: ControllerRegistry) -> Self {
        Self {
            registry,
            gamepad: Box::new(NoneController),
            touch: TouchJoystickController::default(),
            mobile_active: false,
            mobile_buffer: None,
            drive_view_visible: true,
        }
    }

    /// A gamepad was plugged in; returns the kind of controller selected for it
    pub fn gamepad_connected(&mut self, id: &str, device: Box<dyn GamepadDevice>) -> ControllerKind {
        self.gamepad = self.registry.controller_for(id, device);
        self.gamepad.kind()
    }

    pub fn gamepad_disconnected(&mut self) {
        info!("Gamepad disconnected");
        self.gamepad = Box::new(NoneController);
    }

    /// Route commands from the touch session instead of the gamepad
    pub fn set_mobile_active(&mut self, active: bool) {
        if self.mobile_active != active {
            debug!("Mobile input {}", if active { "active" } else { "inactive" });
            self.mobile_active = active;
            if !active {
                self.mobile_buffer = None;
                self.touch.reset();
            }
        }
    }

    pub fn is_mobile_active(&self) -> bool {
        self.mobile_active
    }

    /// Latest command pushed by a mobile client; takes precedence over the on-screen stick
    pub fn push_mobile_command(&mut self, command: InputCommand) {
        self.mobile_buffer = Some(command);
    }

    pub fn touch_mut(&mut self) -> &mut TouchJoystickController {
        &mut self.touch
    }

    /// Hidden drive view means gamepad input is not meant for the rover
    pub fn set_drive_view_visible(&mut self, visible: bool) {
        self.drive_view_visible = visible;
    }

    pub fn controller_kind(&self) -> ControllerKind {
        self.gamepad.kind()
    }

    /// Poll the live device and build this cycle's command
    pub fn next_command(&mut self) -> LiveCommand {
        if self.mobile_active {
            let healthy = self.touch.poll();
            let command = self.mobile_buffer.clone().unwrap_or_else(|| self.touch.command());
            return LiveCommand { command, healthy, source: ControllerKind::TouchJoystick };
        }

        let healthy = self.gamepad.poll();
        let command =
            if self.drive_view_visible { self.gamepad.command() } else { InputCommand::neutral() };
        LiveCommand { command, healthy, source: self.gamepad.kind() }
    }
}
