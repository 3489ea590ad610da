//! Error types for the synchronization core
//!
//! Transport failures never escape as panics: they are returned from
//! `connect()` or surfaced as connection status events.

use thiserror::Error;

use crate::types::ConnectionState;

/// Result type for transport client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by the transport client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The call is not valid in the current connection state
    #[error("operation not valid while {state}")]
    InvalidState { state: ConnectionState },

    /// The channel did not open within the connect budget
    #[error("connection attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The underlying channel failed to open
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `disconnect()` was called while the attempt was in flight
    #[error("connection attempt aborted by disconnect")]
    Aborted,
}

/// Channel-level failures reported by a [`Connector`](crate::client::Connector)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("channel closed")]
    Closed,

    #[error("io error: {0}")]
    Io(String),
}

/// Malformed wire frames
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Alert decoding and ledger bookkeeping errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert is missing an id")]
    MissingId,

    #[error("alert {id} is already active")]
    Duplicate { id: String },

    #[error("alert {id} expires before it was created")]
    InvalidWindow { id: String },

    #[error("alert {id} has confidence {value} outside 0-100")]
    InvalidConfidence { id: String, value: f64 },

    #[error("invalid alert payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: impl ToString) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ClientError::InvalidState {
            state: ConnectionState::Connecting,
        };
        assert_eq!(err.to_string(), "operation not valid while connecting");

        let err = ClientError::Timeout { timeout_ms: 2000 };
        assert!(err.to_string().contains("2000ms"));

        let err: ClientError = TransportError::Connect("refused".to_string()).into();
        assert_eq!(err.to_string(), "connect failed: refused");
    }
}
