//! Wire payloads sent to and received from the rover

use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Normalized drive command produced once per control tick
///
/// Axes are always present. Buttons and arrows are only serialized while pressed,
/// so receivers must treat a missing field as released.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct InputCommand {
    pub steering: f64,
    pub throttle: f64,
    pub pan: f64,
    pub tilt: f64,

    #[serde(default, skip_serializing_if = "is_false")]
    pub button_a: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub button_b: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub button_x: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub button_y: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub button_center: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub button_left: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub button_right: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub arrow_up: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub arrow_down: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub arrow_left: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub arrow_right: bool,

    /// PTZ routing: 0 front, 1 rear, -1 none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<i8>,
}

impl InputCommand {
    /// All axes centred, nothing pressed
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Builder-style PTZ routing
    pub fn with_camera_id(mut self, camera_id: i8) -> Self {
        self.camera_id = Some(camera_id);
        self
    }

    /// Whether any button or arrow is held
    pub fn any_pressed(&self) -> bool {
        self.button_a
            || self.button_b
            || self.button_x
            || self.button_y
            || self.button_center
            || self.button_left
            || self.button_right
            || self.arrow_up
            || self.arrow_down
            || self.arrow_left
            || self.arrow_right
    }
}

/// Out-of-cycle request asking the server to hand control to this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeOverRequest {
    #[serde(rename = "_operator")]
    pub operator: String,
}

impl TakeOverRequest {
    pub fn force() -> Self {
        Self { operator: "force".to_string() }
    }
}

/// Camera capture request, `{quality}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub quality: u8,
}

/// Text control message on a camera socket
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum CameraControlMessage {
    /// Stream geometry announced before the first frame
    Init { width: u32, height: u32 },
    #[serde(other)]
    Unknown,
}

/// Drive socket acknowledgment
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerAck {
    /// `"operator"` when this client holds control
    #[serde(default)]
    pub control: Option<String>,
}

impl ServerAck {
    pub fn grants_operator(&self) -> bool {
        self.control.as_deref() == Some("operator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn released_buttons_are_omitted() {
        let command = InputCommand { steering: 0.5, throttle: -0.25, ..InputCommand::neutral() };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value, json!({"steering": 0.5, "throttle": -0.25, "pan": 0.0, "tilt": 0.0}));
    }

    #[test]
    fn pressed_buttons_and_camera_id_are_sent() {
        let command =
            InputCommand { button_y: true, arrow_left: true, ..InputCommand::neutral() }
                .with_camera_id(1);
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["button_y"], json!(true));
        assert_eq!(value["arrow_left"], json!(true));
        assert_eq!(value["camera_id"], json!(1));
        assert!(value.get("button_a").is_none());
        assert!(command.any_pressed());
    }

    #[test]
    fn sparse_commands_deserialize_with_defaults() {
        let command: InputCommand =
            serde_json::from_str(r#"{"steering":0.1,"throttle":0.2,"pan":0,"tilt":0}"#).unwrap();
        assert!(!command.any_pressed());
        assert_eq!(command.camera_id, None);
    }

    #[test]
    fn take_over_sentinel_shape() {
        let text = serde_json::to_string(&TakeOverRequest::force()).unwrap();
        assert_eq!(text, r#"{"_operator":"force"}"#);
    }

    #[test]
    fn camera_control_messages() {
        let init: CameraControlMessage =
            serde_json::from_str(r#"{"action":"init","width":640,"height":480}"#).unwrap();
        assert_eq!(init, CameraControlMessage::Init { width: 640, height: 480 });

        let other: CameraControlMessage =
            serde_json::from_str(r#"{"action":"reboot"}"#).unwrap();
        assert_eq!(other, CameraControlMessage::Unknown);
    }

    #[test]
    fn ack_control_field() {
        let ack: ServerAck = serde_json::from_str(r#"{"control":"operator","x":1}"#).unwrap();
        assert!(ack.grants_operator());
        let ack: ServerAck = serde_json::from_str(r#"{"control":"viewer"}"#).unwrap();
        assert!(!ack.grants_operator());
        let ack: ServerAck = serde_json::from_str("{}").unwrap();
        assert!(!ack.grants_operator());
    }
}
