//! Error types for the engine.

use statesync_core::CoreError;
use statesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while running a session.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Tree error.
    #[error("tree error: {0}")]
    Core(#[from] CoreError),

    /// Wire format error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the send can be retried.
        retryable: bool,
    },

    /// The transport is closed.
    #[error("transport not connected")]
    NotConnected,

    /// An inbound batch holds more messages than the session accepts.
    #[error("batch of {size} messages exceeds the limit of {max}")]
    BatchTooLarge {
        /// Messages in the batch.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// No method, or more than one, matches a template method call.
    #[error("{matches} handlers match method `{method}` on <{tag}>")]
    AmbiguousOrMissingHandler {
        /// Tag of the target element.
        tag: String,
        /// Requested method.
        method: String,
        /// Number of matching registrations.
        matches: usize,
    },
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed send can be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::transport_retryable("connection reset").is_retryable());
        assert!(!EngineError::transport_fatal("socket closed").is_retryable());
        assert!(!EngineError::NotConnected.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EngineError::BatchTooLarge { size: 12, max: 10 };
        assert_eq!(err.to_string(), "batch of 12 messages exceeds the limit of 10");

        let err = EngineError::AmbiguousOrMissingHandler {
            tag: "my-list".into(),
            method: "select".into(),
            matches: 0,
        };
        assert_eq!(err.to_string(), "0 handlers match method `select` on <my-list>");
    }
}
