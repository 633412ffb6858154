//! Decorated server telemetry from the `/ws/log` socket

use serde::Serialize;
use serde_json::{Map, Value};

/// Control mode value the server reports while the autopilot drives
pub const AUTOPILOT_CONTROL_MODE: i64 = 5;

/// Compass points used for the heading label, clockwise from north
const COMPASS_POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Server telemetry with derived fields, immutable once decorated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerTelemetryMessage {
    raw: Map<String, Value>,
    is_on_autopilot: bool,
    has_clear_passage: bool,
    heading_text: String,
}

impl ServerTelemetryMessage {
    /// Decorate a raw telemetry object
    pub fn decorate(raw: Map<String, Value>) -> Self {
        let is_on_autopilot =
            raw.get("ctl").and_then(Value::as_i64) == Some(AUTOPILOT_CONTROL_MODE);
        let has_clear_passage =
            raw.get("inf_total_penalty").and_then(Value::as_f64).is_some_and(|p| p < 1.0);
        let heading_text = raw
            .get("geo_head")
            .and_then(Value::as_f64)
            .map(format_heading)
            .unwrap_or_else(|| "n/a".to_string());

        Self { raw, is_on_autopilot, has_clear_passage, heading_text }
    }

    /// Parse and decorate a text frame
    pub fn parse(text: &str) -> crate::Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(raw) => Ok(Self::decorate(raw)),
            other => Err(crate::TeleopError::protocol(
                crate::telemetry::TELEMETRY_PATH,
                format!("expected a JSON object, got {}", other),
            )),
        }
    }

    pub fn is_on_autopilot(&self) -> bool {
        self.is_on_autopilot
    }

    pub fn has_clear_passage(&self) -> bool {
        self.has_clear_passage
    }

    pub fn heading_text(&self) -> &str {
        &self.heading_text
    }

    /// Field of the undecorated server message
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

fn format_heading(degrees: f64) -> String {
    let normalized = degrees.rem_euclid(360.0);
    let sector = ((normalized + 22.5) / 45.0) as usize % COMPASS_POINTS.len();
    format!("{:.1}° {}", normalized, COMPASS_POINTS[sector])
}
