//! Standard-layout gamepads

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ControllerKind, InputController, collapse};
use crate::types::InputCommand;

/// Both triggers must be seen below this once before a pad is trusted
pub const TRIGGER_REST_THRESHOLD: f64 = 0.05;

/// One button of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GamepadButton {
    pub pressed: bool,
    /// Analogue position, 0..=1
    pub value: f64,
}

/// Device state in the W3C "standard gamepad" layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamepadSnapshot {
    pub id: String,
    pub connected: bool,
    pub axes: Vec<f64>,
    pub buttons: Vec<GamepadButton>,
}

impl GamepadSnapshot {
    /// Idle pad with four axes and seventeen buttons
    pub fn standard(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connected: true,
            axes: vec![0.0; 4],
            buttons: vec![GamepadButton::default(); 17],
        }
    }

    pub fn with_axis(mut self, index: usize, value: f64) -> Self {
        if let Some(axis) = self.axes.get_mut(index) {
            *axis = value;
        }
        self
    }

    /// Set an analogue button; it counts as pressed above half travel
    pub fn with_button(mut self, index: usize, value: f64) -> Self {
        if let Some(button) = self.buttons.get_mut(index) {
            *button = GamepadButton { pressed: value > 0.5, value };
        }
        self
    }

    /// Missing axes read as centred
    pub fn axis(&self, index: usize) -> f64 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }

    pub fn button(&self, index: usize) -> GamepadButton {
        self.buttons.get(index).copied().unwrap_or_default()
    }
}

/// Where snapshots come from (HID backend, browser bridge, test fixture)
pub trait GamepadDevice: Send {
    /// Latest state, `None` once the device is gone
    fn snapshot(&mut self) -> Option<GamepadSnapshot>;
}

/// Vendor and product ids parsed from a gamepad id string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamepadInfo {
    pub vendor: u16,
    pub product: u16,
    pub name: String,
}

impl GamepadInfo {
    /// Parse Chromium (`"Name (... Vendor: 045e Product: 028e)"`) or Firefox
    /// (`"45e-28e-Name"`) style ids
    pub fn parse(id: &str) -> Option<Self> {
        Self::parse_chromium(id).or_else(|| Self::parse_firefox(id))
    }

    fn parse_chromium(id: &str) -> Option<Self> {
        let vendor = hex_after(id, "Vendor: ")?;
        let product = hex_after(id, "Product: ")?;
        let name = id.split(" (").next().unwrap_or(id).trim().to_string();
        Some(Self { vendor, product, name })
    }

    fn parse_firefox(id: &str) -> Option<Self> {
        let mut parts = id.splitn(3, '-');
        let vendor = parse_hex(parts.next()?)?;
        let product = parse_hex(parts.next()?)?;
        let name = parts.next().unwrap_or_default().trim().to_string();
        Some(Self { vendor, product, name })
    }
}

fn hex_after(id: &str, label: &str) -> Option<u16> {
    let start = id.find(label)? + label.len();
    let digits: String =
        id[start..].chars().take_while(|c| c.is_ascii_hexdigit()).take(4).collect();
    parse_hex(&digits)
}

fn parse_hex(text: &str) -> Option<u16> {
    let text = text.trim();
    if text.is_empty() || text.len() > 4 {
        return None;
    }
    u16::from_str_radix(text, 16).ok()
}

/// Axis and button indices of one controller model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamepadMapping {
    pub steering_axis: usize,
    pub pan_axis: usize,
    pub tilt_axis: usize,
    pub left_trigger: usize,
    pub right_trigger: usize,
    pub button_a: usize,
    pub button_b: usize,
    pub button_x: usize,
    pub button_y: usize,
    pub button_left: usize,
    pub button_right: usize,
    pub button_center: usize,
    pub arrow_up: usize,
    pub arrow_down: usize,
    pub arrow_left: usize,
    pub arrow_right: usize,
    pub dead_zone: f64,
}

impl GamepadMapping {
    /// W3C standard layout
    pub fn standard(dead_zone: f64) -> Self {
        Self {
            steering_axis: 0,
            pan_axis: 2,
            tilt_axis: 3,
            left_trigger: 6,
            right_trigger: 7,
            button_a: 0,
            button_b: 1,
            button_x: 2,
            button_y: 3,
            button_left: 4,
            button_right: 5,
            button_center: 16,
            arrow_up: 12,
            arrow_down: 13,
            arrow_left: 14,
            arrow_right: 15,
            dead_zone,
        }
    }
}

/// Gamepad with a per-model mapping and the half-throttle activation guard
pub struct StandardGamepadController {
    info: GamepadInfo,
    mapping: GamepadMapping,
    device: Box<dyn GamepadDevice>,
    snapshot: Option<GamepadSnapshot>,
    activated: bool,
    healthy: bool,
}

impl StandardGamepadController {
    pub fn new(info: GamepadInfo, mapping: GamepadMapping, device: Box<dyn GamepadDevice>) -> Self {
        Self { info, mapping, device, snapshot: None, activated: false, healthy: false }
    }

    pub fn info(&self) -> &GamepadInfo {
        &self.info
    }

    /// Whether both triggers have been seen at rest
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    fn pressed(&self, snapshot: &GamepadSnapshot, index: usize) -> bool {
        snapshot.button(index).pressed
    }
}

impl InputController for StandardGamepadController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::StandardGamepad
    }

    fn poll(&mut self) -> bool {
        self.snapshot = self.device.snapshot().filter(|snapshot| snapshot.connected);
        let Some(snapshot) = &self.snapshot else {
            if self.healthy {
                info!("Gamepad '{}' stopped reporting", self.info.name);
            }
            self.healthy = false;
            return false;
        };

        if !self.activated {
            let left = snapshot.button(self.mapping.left_trigger).value;
            let right = snapshot.button(self.mapping.right_trigger).value;
            if left < TRIGGER_REST_THRESHOLD && right < TRIGGER_REST_THRESHOLD {
                debug!("Gamepad '{}' activated", self.info.name);
                self.activated = true;
            }
        }
        self.healthy = self.activated;
        self.healthy
    }

    fn reset(&mut self) {
        self.snapshot = None;
        self.activated = false;
        self.healthy = false;
    }

    fn command(&self) -> InputCommand {
        let Some(snapshot) = self.snapshot.as_ref().filter(|_| self.healthy) else {
            return InputCommand::neutral();
        };
        let m = &self.mapping;
        let throttle = snapshot.button(m.right_trigger).value - snapshot.button(m.left_trigger).value;

        InputCommand {
            steering: collapse(snapshot.axis(m.steering_axis), m.dead_zone),
            throttle: collapse(throttle, m.dead_zone),
            pan: collapse(snapshot.axis(m.pan_axis), m.dead_zone),
            tilt: collapse(snapshot.axis(m.tilt_axis), m.dead_zone),
            button_a: self.pressed(snapshot, m.button_a),
            button_b: self.pressed(snapshot, m.button_b),
            button_x: self.pressed(snapshot, m.button_x),
            button_y: self.pressed(snapshot, m.button_y),
            button_center: self.pressed(snapshot, m.button_center),
            button_left: self.pressed(snapshot, m.button_left),
            button_right: self.pressed(snapshot, m.button_right),
            arrow_up: self.pressed(snapshot, m.arrow_up),
            arrow_down: self.pressed(snapshot, m.arrow_down),
            arrow_left: self.pressed(snapshot, m.arrow_left),
            arrow_right: self.pressed(snapshot, m.arrow_right),
            camera_id: None,
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SharedGamepad;

    const XBOX_ID: &str = "Xbox 360 Controller (XInput STANDARD GAMEPAD Vendor: 045e Product: 028e)";

    fn controller(pad: &SharedGamepad) -> StandardGamepadController {
        let info = GamepadInfo::parse(XBOX_ID).unwrap();
        StandardGamepadController::new(info, GamepadMapping::standard(0.1), Box::new(pad.clone()))
    }

    #[test]
    fn parses_chromium_ids() {
        let info = GamepadInfo::parse(XBOX_ID).unwrap();
        assert_eq!(info.vendor, 0x045e);
        assert_eq!(info.product, 0x028e);
        assert_eq!(info.name, "Xbox 360 Controller");
    }

    #[test]
    fn parses_firefox_ids() {
        let info = GamepadInfo::parse("54c-9cc-Wireless Controller").unwrap();
        assert_eq!((info.vendor, info.product), (0x054c, 0x09cc));
        assert_eq!(info.name, "Wireless Controller");

        assert!(GamepadInfo::parse("Generic USB Joystick").is_none());
        assert!(GamepadInfo::parse("xyz-028e-Pad").is_none());
    }

    #[test]
    fn half_throttle_on_connect_never_activates() {
        let pad = SharedGamepad::new(
            GamepadSnapshot::standard(XBOX_ID).with_button(6, 0.5).with_button(7, 0.5),
        );
        let mut controller = controller(&pad);

        for _ in 0..100 {
            assert!(!controller.poll());
            assert_eq!(controller.command().throttle, 0.0);
        }
        assert!(!controller.is_activated());
    }

    #[test]
    fn resting_triggers_activate_and_map_throttle() {
        let pad = SharedGamepad::new(GamepadSnapshot::standard(XBOX_ID));
        let mut controller = controller(&pad);
        assert!(controller.poll());

        pad.set(
            GamepadSnapshot::standard(XBOX_ID)
                .with_button(7, 1.0)
                .with_button(6, 0.0)
                .with_axis(0, -1.0)
                .with_axis(3, 0.05)
                .with_button(3, 1.0)
                .with_button(15, 1.0),
        );
        assert!(controller.poll());
        let command = controller.command();
        assert_eq!(command.throttle, 1.0);
        assert_eq!(command.steering, -1.0);
        assert_eq!(command.tilt, 0.0);
        assert!(command.button_y && command.arrow_right);
        assert!(!command.button_a);

        // Reverse: left trigger wins
        pad.set(GamepadSnapshot::standard(XBOX_ID).with_button(6, 1.0));
        controller.poll();
        assert_eq!(controller.command().throttle, -1.0);
    }

    #[test]
    fn disconnect_and_reset_drop_health() {
        let pad = SharedGamepad::new(GamepadSnapshot::standard(XBOX_ID));
        let mut controller = controller(&pad);
        assert!(controller.poll());

        pad.disconnect();
        assert!(!controller.poll());
        assert_eq!(controller.command(), InputCommand::neutral());

        pad.set(GamepadSnapshot::standard(XBOX_ID).with_button(7, 0.6));
        controller.reset();
        assert!(!controller.poll());
    }
}
