// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for eventd client operations

use thiserror::Error;

use crate::state_machine::TransitionError;

/// Errors that can occur while configuring or using the eventd client
#[derive(Debug, Error)]
pub enum EventdError {
    /// The `eventd` configuration section could not be read or parsed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The configured NKey seed is not a valid user seed
    #[error("Invalid nkey: {0}")]
    InvalidNkey(String),

    /// The configured NKey seed file could not be resolved or read
    #[error("Invalid nkey file: {0}")]
    NkeyFile(String),

    /// Dialing the NATS server failed
    #[error("NATS connection error: {0}")]
    Connection(String),

    /// The client has no live connection yet
    #[error("Client not connected: {0}")]
    NotConnected(String),

    /// NATS publish error
    #[error("NATS publish error: {0}")]
    Publish(String),

    /// NATS subscribe error
    #[error("NATS subscribe error: {0}")]
    Subscribe(String),

    /// NATS request-reply error
    #[error("NATS request error: {0}")]
    Request(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Startup lifecycle received an input it cannot accept
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] TransitionError),
}

impl EventdError {
    /// Returns true if the failure is transient and the operation may succeed
    /// when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventdError::Connection(_) | EventdError::Timeout(_))
    }
}

/// Result type for eventd client operations
pub type EventdResult<T> = Result<T, EventdError>;

impl From<serde_json::Error> for EventdError {
    fn from(err: serde_json::Error) -> Self {
        EventdError::Serialization(err.to_string())
    }
}

impl From<nkeys::error::Error> for EventdError {
    fn from(err: nkeys::error::Error) -> Self {
        EventdError::InvalidNkey(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EventdError::Connection("refused".into()).is_retryable());
        assert!(EventdError::Timeout("dial".into()).is_retryable());

        assert!(!EventdError::InvalidNkey("not a user seed".into()).is_retryable());
        assert!(!EventdError::NkeyFile("missing".into()).is_retryable());
        assert!(!EventdError::Configuration("bad yaml".into()).is_retryable());
        assert!(!EventdError::NotConnected("no conn".into()).is_retryable());
    }
}
