//! On-screen joystick for touch devices

use super::{ControllerKind, InputController};
use crate::types::InputCommand;

/// Virtual joystick: the first touch sets the pivot, dragging away from it steers
/// (horizontal) and drives (vertical, up is forward)
#[derive(Debug, Clone)]
pub struct TouchJoystickController {
    radius: f64,
    pivot: Option<(f64, f64)>,
    position: (f64, f64),
}

impl TouchJoystickController {
    /// `radius` is the drag distance for full deflection, in screen units
    pub fn new(radius: f64) -> Self {
        Self { radius: radius.abs().max(f64::EPSILON), pivot: None, position: (0.0, 0.0) }
    }

    pub fn touch_start(&mut self, x: f64, y: f64) {
        self.pivot = Some((x, y));
        self.position = (x, y);
    }

    /// Ignored without an active touch
    pub fn touch_move(&mut self, x: f64, y: f64) {
        if self.pivot.is_some() {
            self.position = (x, y);
        }
    }

    pub fn touch_end(&mut self) {
        self.pivot = None;
    }

    pub fn is_touching(&self) -> bool {
        self.pivot.is_some()
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Default for TouchJoystickController {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl InputController for TouchJoystickController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::TouchJoystick
    }

    /// Touch input is always usable; lifting the finger just centres the stick
    fn poll(&mut self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.pivot = None;
        self.position = (0.0, 0.0);
    }

    fn command(&self) -> InputCommand {
        let Some((px, py)) = self.pivot else {
            return InputCommand::neutral();
        };
        let (x, y) = self.position;
        InputCommand {
            steering: ((x - px) / self.radius).clamp(-1.0, 1.0),
            throttle: (-(y - py) / self.radius).clamp(-1.0, 1.0),
            ..InputCommand::neutral()
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_maps_to_steering_and_throttle() {
        let mut stick = TouchJoystickController::new(50.0);
        stick.touch_start(200.0, 300.0);
        assert_eq!(stick.command(), InputCommand::neutral());

        stick.touch_move(225.0, 280.0);
        let command = stick.command();
        assert_eq!(command.steering, 0.5);
        assert_eq!(command.throttle, 0.4);

        stick.touch_move(0.0, 1000.0);
        let command = stick.command();
        assert_eq!(command.steering, -1.0);
        assert_eq!(command.throttle, -1.0);
    }

    #[test]
    fn lifting_centres_the_stick() {
        let mut stick = TouchJoystickController::default();
        stick.touch_start(10.0, 10.0);
        stick.touch_move(60.0, 10.0);
        stick.touch_end();
        assert!(!stick.is_touching());
        assert_eq!(stick.command(), InputCommand::neutral());

        // Moves without a touch are ignored
        stick.touch_move(500.0, 500.0);
        assert_eq!(stick.command(), InputCommand::neutral());
        assert!(stick.poll());
    }
}
