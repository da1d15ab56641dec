//! Error types for the realtime connection manager
//!
//! None of these cross the public operations of
//! [`ConnectionManager`](crate::manager::ConnectionManager): `connect`, `send`,
//! `on`, `off` and `disconnect` turn every failure into a logged diagnostic.
//! The types exist so the internal steps (parsing, serializing, transport
//! I/O) can use `?` and so diagnostics carry a structured cause.

use crate::manager::ConnectionState;
use thiserror::Error;

/// Errors raised inside the connection manager
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Inbound message could not be parsed: {message}")]
    Parse { message: String },

    #[error("Outbound payload could not be serialized")]
    Serialize(#[source] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No Tokio runtime available to drive the connection")]
    RuntimeUnavailable,

    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },

    #[error("Timed out after {waited_ms}ms waiting for the connection to open")]
    Timeout { waited_ms: u64 },

    #[error("Reconnection gave up: {reason}")]
    GaveUp { reason: String },
}

impl ManagerError {
    /// Create a parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Whether the error is terminal for the current connection target
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManagerError::GaveUp { .. })
    }
}

/// Errors surfaced by a [`Connector`](crate::transport::Connector) implementation
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {url} failed")]
    ConnectFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to write frame")]
    SendFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to read frame")]
    ReceiveFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(String),
}

/// Result type for manager internals
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Boxed error returned by message handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constructor() {
        let error = ManagerError::parse("expected value at line 1 column 1");
        assert!(matches!(error, ManagerError::Parse { .. }));
        assert_eq!(
            error.to_string(),
            "Inbound message could not be parsed: expected value at line 1 column 1"
        );
    }

    #[test]
    fn test_transport_error_converts() {
        let transport = TransportError::UnsupportedFrame("binary".to_string());
        let error: ManagerError = transport.into();
        assert!(matches!(error, ManagerError::Transport(_)));
        assert!(error.to_string().contains("binary"));
    }

    #[test]
    fn test_connect_failed_keeps_source() {
        let error = TransportError::ConnectFailed {
            url: "ws://localhost:1".to_string(),
            source: "connection refused".into(),
        };
        assert_eq!(error.to_string(), "Connection to ws://localhost:1 failed");
        let source = std::error::Error::source(&error).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_only_gave_up_is_terminal() {
        assert!(ManagerError::GaveUp {
            reason: "max attempts".to_string()
        }
        .is_terminal());
        assert!(!ManagerError::Timeout { waited_ms: 10 }.is_terminal());
        assert!(!ManagerError::RuntimeUnavailable.is_terminal());
    }

    #[test]
    fn test_error_display_not_empty() {
        let errors = vec![
            ManagerError::parse("bad"),
            ManagerError::RuntimeUnavailable,
            ManagerError::NotConnected {
                state: ConnectionState::Idle,
            },
            ManagerError::Timeout { waited_ms: 5 },
            ManagerError::GaveUp {
                reason: "test".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
