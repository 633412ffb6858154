//! Known controller table

use tracing::{info, warn};

use super::gamepad::{GamepadDevice, GamepadInfo, GamepadMapping, StandardGamepadController};
use super::{InputController, NoneController};

/// One supported controller model
#[derive(Debug, Clone, PartialEq)]
pub struct KnownController {
    pub name: &'static str,
    pub vendor: u16,
    pub product: u16,
    pub mapping: GamepadMapping,
}

impl KnownController {
    fn standard(name: &'static str, vendor: u16, product: u16, dead_zone: f64) -> Self {
        Self { name, vendor, product, mapping: GamepadMapping::standard(dead_zone) }
    }
}

/// Matches connected gamepads against supported models
#[derive(Debug, Clone)]
pub struct ControllerRegistry {
    known: Vec<KnownController>,
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self {
            known: vec![
                KnownController::standard("Xbox 360 Controller", 0x045e, 0x028e, 0.1),
                KnownController::standard("Xbox One Controller", 0x045e, 0x02dd, 0.1),
                KnownController::standard("Xbox One S Controller", 0x045e, 0x02ea, 0.1),
                KnownController::standard("Xbox Wireless Controller", 0x045e, 0x0b13, 0.1),
                KnownController::standard("DualShock 4", 0x054c, 0x05c4, 0.08),
                KnownController::standard("DualShock 4 (v2)", 0x054c, 0x09cc, 0.08),
                KnownController::standard("DualSense", 0x054c, 0x0ce6, 0.08),
                KnownController::standard("Logitech F710", 0x046d, 0xc21f, 0.15),
            ],
        }
    }
}

impl ControllerRegistry {
    /// Registry with no entries; every pad falls back to the inert controller
    pub fn empty() -> Self {
        Self { known: Vec::new() }
    }

    /// Add or replace a model
    pub fn register(&mut self, controller: KnownController) {
        self.known.retain(|k| (k.vendor, k.product) != (controller.vendor, controller.product));
        self.known.push(controller);
    }

    pub fn lookup(&self, id: &str) -> Option<(&KnownController, GamepadInfo)> {
        let info = GamepadInfo::parse(id)?;
        let known =
            self.known.iter().find(|k| k.vendor == info.vendor && k.product == info.product)?;
        Some((known, info))
    }

    /// Controller for a newly connected pad; unknown pads get the inert controller
    pub fn controller_for(
        &self,
        id: &str,
        device: Box<dyn GamepadDevice>,
    ) -> Box<dyn InputController> {
        match self.lookup(id) {
            Some((known, info)) => {
                info!("Using {} mapping for '{}'", known.name, id);
                Box::new(StandardGamepadController::new(info, known.mapping.clone(), device))
            }
            None => {
                warn!("Unsupported gamepad '{}', input disabled", id);
                Box::new(NoneController)
            }
        }
    }

    pub fn known(&self) -> &[KnownController] {
        &self.known
    }
}
