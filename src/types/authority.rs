//! Control authority as seen by the drive transport

use serde::{Deserialize, Serialize};

/// Who may drive, from this client's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum ControlAuthority {
    /// Server granted control and the local input device is healthy
    OperatorActive,
    /// Another client (or the autopilot) holds control, or the local device is not usable
    OperatorViewOnly,
    /// No drive socket
    #[default]
    Disconnected,
}

impl ControlAuthority {
    /// Resolve authority from the server's verdict and local device health
    pub fn resolve(granted: bool, device_healthy: bool) -> Self {
        if granted && device_healthy {
            ControlAuthority::OperatorActive
        } else {
            ControlAuthority::OperatorViewOnly
        }
    }
}

/// Persistent operator banner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum Banner {
    #[default]
    None,
    ConnectionLost,
    ControllerNotDetected,
    ViewOnly,
}

/// Snapshot published by the drive transport after every state change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ControlStatus {
    pub authority: ControlAuthority,
    pub controller_healthy: bool,
    /// Raw `control` value of the last acknowledgment
    pub server_control: Option<String>,
    pub commands_sent: u64,
}

impl ControlStatus {
    /// Banner the operator should see for this status
    pub fn banner(&self) -> Banner {
        match self.authority {
            ControlAuthority::Disconnected => Banner::ConnectionLost,
            ControlAuthority::OperatorActive => Banner::None,
            ControlAuthority::OperatorViewOnly => {
                let granted = self.server_control.as_deref() == Some("operator");
                if granted && !self.controller_healthy {
                    Banner::ControllerNotDetected
                } else {
                    Banner::ViewOnly
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_needs_grant_and_health() {
        assert_eq!(ControlAuthority::resolve(true, true), ControlAuthority::OperatorActive);
        assert_eq!(ControlAuthority::resolve(true, false), ControlAuthority::OperatorViewOnly);
        assert_eq!(ControlAuthority::resolve(false, true), ControlAuthority::OperatorViewOnly);
    }

    #[test]
    fn banner_follows_status() {
        let mut status = ControlStatus::default();
        assert_eq!(status.banner(), Banner::ConnectionLost);

        status.server_control = Some("operator".into());
        status.authority = ControlAuthority::OperatorViewOnly;
        assert_eq!(status.banner(), Banner::ControllerNotDetected);

        status.controller_healthy = true;
        status.authority = ControlAuthority::OperatorActive;
        assert_eq!(status.banner(), Banner::None);

        status.server_control = Some("viewer".into());
        status.authority = ControlAuthority::OperatorViewOnly;
        assert_eq!(status.banner(), Banner::ViewOnly);
    }
}
