//! # Error Types
//!
//! Custom error types for AgriRover Link using `thiserror`.

use thiserror::Error;

/// Telemetry frame decoding errors
///
/// Always recovered locally: the frame is dropped and the session keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame could not be parsed as a telemetry object
    #[error("malformed telemetry frame: {0}")]
    Malformed(String),
}

/// Transport-level errors shared by the telemetry and relay sessions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    /// Peer closed the connection unexpectedly
    #[error("connection closed by peer")]
    Closed,

    /// Read or write failure on an open connection
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Main error type for AgriRover Link
#[derive(Debug, Error)]
pub enum AgriLinkError {
    /// Telemetry decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prompt was empty after trimming
    #[error("prompt is empty")]
    EmptyPrompt,
}

/// Result type alias for AgriRover Link
pub type Result<T> = std::result::Result<T, AgriLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failed_message_names_endpoint() {
        let err = TransportError::ConnectFailed {
            endpoint: "ws://10.0.0.1/ws".to_string(),
            reason: "refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ws://10.0.0.1/ws"));
        assert!(msg.contains("refused"));
    }

    #[test]
    fn test_transport_error_converts_into_crate_error() {
        let err: AgriLinkError = TransportError::Closed.into();
        assert!(matches!(err, AgriLinkError::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Malformed("expected value".to_string());
        assert_eq!(err.to_string(), "malformed telemetry frame: expected value");
    }
}
