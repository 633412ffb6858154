//! Session behaviour with a rover that never answers
//!
//! Uses only the public API, including a hand-written [`Connector`], to check that an
//! unreachable rover is never an error: every channel keeps retrying on its own delay
//! and the operator sees a disconnected state.

use rover_teleop::{
    Banner, ConnectionState, Connector, ControlAuthority, Result, Teleop, TeleopConfig,
    TeleopError, Transport,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Refuses every handshake and counts attempts per path
#[derive(Default)]
struct RefusingConnector {
    attempts: Mutex<HashMap<String, usize>>,
}

impl RefusingConnector {
    fn attempts(&self, path: &str) -> usize {
        let attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.iter().filter(|(url, _)| url.ends_with(path)).map(|(_, n)| *n).sum()
    }
}

#[async_trait::async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        *self
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default() += 1;
        Err(TeleopError::connection_failed(format!("{} is unreachable", url)))
    }
}

fn config() -> TeleopConfig {
    TeleopConfig::from_yaml_str(
        r#"
server:
  scheme: http
  host: rover.local
  port: 8080
"#,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn every_channel_retries_on_its_own_delay() {
    let _ = tracing_subscriber::fmt::try_init();
    let connector = Arc::new(RefusingConnector::default());
    let session = Teleop::connect_with(connector.clone(), &config(), true).unwrap();
    session.cameras.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1010)).await;

    // 100 ms for drive and telemetry, 250 ms for cameras, plus the first attempt
    assert_eq!(connector.attempts("/ws/ctl"), 11);
    assert_eq!(connector.attempts("/ws/log"), 11);
    assert_eq!(connector.attempts("/ws/cam/front"), 5);
    assert_eq!(connector.attempts("/ws/cam/rear"), 5);

    let drive = session.drive.as_ref().unwrap();
    assert_eq!(drive.authority(), ControlAuthority::Disconnected);
    assert_eq!(drive.status().banner(), Banner::ConnectionLost);
    assert_ne!(session.telemetry.connection_state(), ConnectionState::Open);
    assert!(session.telemetry.latest().is_none());
}

#[tokio::test(start_paused = true)]
async fn stopped_cameras_stop_retrying() {
    let connector = Arc::new(RefusingConnector::default());
    let session = Teleop::connect_with(connector.clone(), &config(), false).unwrap();
    session.cameras.start().unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    session.cameras.stop().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let front = connector.attempts("/ws/cam/front");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(connector.attempts("/ws/cam/front"), front);
    assert!(connector.attempts("/ws/log") > 20, "telemetry keeps retrying");
}
