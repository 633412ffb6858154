//! Error types for the teleoperation transport layer.
//!
//! Almost nothing in this crate is fatal. Socket faults are absorbed by the reconnect
//! policy and stalled cameras by the capture watchdog, so most of these variants are
//! only seen by code that sets the stack up (bad config, bad endpoint) or by callers
//! talking to a component whose task has already shut down.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: WebSocket handshake or I/O failures
//! - **Protocol Errors**: Frames the peer should never send
//! - **Parse Errors**: JSON or YAML payloads that fail to deserialize
//! - **Config Errors**: Values that violate the controller invariants
//! - **Channel Errors**: A handle outliving the task it talks to
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use rover_teleop::TeleopError;
//!
//! let error = TeleopError::connection_failed("rover unreachable");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for teleoperation operations.
pub type Result<T, E = TeleopError> = std::result::Result<T, E>;

/// Main error type for teleoperation operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TeleopError {
    #[error("Failed to connect to rover: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Protocol violation on {path}: {details}")]
    Protocol { path: String, details: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Config file error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{component} is no longer running")]
    ChannelClosed { component: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl TeleopError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TeleopError::Connection { .. } => true,
            TeleopError::Timeout { .. } => true,
            TeleopError::Protocol { .. } => true,
            TeleopError::Parse { .. } => false,
            TeleopError::Config { .. } => false,
            TeleopError::Io { .. } => false,
            TeleopError::ChannelClosed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TeleopError::Connection { .. } => vec![
                "Check the rover is powered and on the same network",
                "Verify the configured host and port",
                "Wait for the automatic reconnect",
            ],
            TeleopError::Protocol { .. } => vec![
                "Check the rover firmware matches this client version",
                "Reconnect to resynchronise the stream",
            ],
            TeleopError::Parse { .. } => vec![
                "Check payload format compatibility",
                "Verify the config file is valid YAML",
            ],
            TeleopError::Config { .. } => vec![
                "Keep min quality at or below max quality",
                "Use non-zero reconnect delays",
            ],
            TeleopError::Io { .. } => vec!["Check the file exists and is readable"],
            TeleopError::ChannelClosed { .. } => vec![
                "Recreate the component",
                "Check logs for the reason the task stopped",
            ],
            TeleopError::Timeout { .. } => {
                vec!["Increase timeout duration", "Check network latency to the rover"]
            }
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TeleopError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TeleopError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl ToString) -> Self {
        TeleopError::Parse { context: context.into(), details: details.to_string() }
    }

    /// Helper constructor for frames the peer should never send.
    pub fn protocol(path: impl Into<String>, details: impl Into<String>) -> Self {
        TeleopError::Protocol { path: path.into(), details: details.into() }
    }

    /// Helper constructor for config errors.
    pub fn config(reason: impl Into<String>) -> Self {
        TeleopError::Config { reason: reason.into() }
    }

    /// Helper constructor for a handle whose task is gone.
    pub fn channel_closed(component: impl Into<String>) -> Self {
        TeleopError::ChannelClosed { component: component.into() }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TeleopError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TeleopError::connection_failed_with_source("WebSocket failure", Box::new(err))
    }
}

impl From<serde_json::Error> for TeleopError {
    fn from(err: serde_json::Error) -> Self {
        TeleopError::parse("JSON payload", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in ".*",
            details in ".*",
            component in "\\w+",
        ) {
            let connection = TeleopError::connection_failed(reason.clone());
            let parse = TeleopError::parse("ack", details.clone());
            let closed = TeleopError::channel_closed(component.clone());

            prop_assert!(connection.to_string().contains(&reason));
            prop_assert!(parse.to_string().contains(&details));
            prop_assert!(closed.to_string().contains(&component));
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<TeleopError>();

        let error = TeleopError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn transient_faults_are_retryable() {
        assert!(TeleopError::connection_failed("x").is_retryable());
        assert!(TeleopError::Timeout { duration: Duration::from_secs(1) }.is_retryable());
        assert!(!TeleopError::config("min > max").is_retryable());
        assert!(!TeleopError::channel_closed("camera front").is_retryable());

        for error in [
            TeleopError::connection_failed("x"),
            TeleopError::config("y"),
            TeleopError::parse("z", "bad"),
        ] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn json_errors_convert_to_parse() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: TeleopError = err.into();
        assert!(matches!(converted, TeleopError::Parse { .. }));
    }

    #[test]
    fn source_chain_is_preserved() {
        let inner = std::io::Error::other("connection reset");
        let error = TeleopError::connection_failed_with_source("camera front", Box::new(inner));
        let source = std::error::Error::source(&error).expect("source");
        assert!(source.to_string().contains("connection reset"));
    }
}
