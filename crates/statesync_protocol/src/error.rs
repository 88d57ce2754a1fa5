//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or replaying wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] statesync_codec::CodecError),

    /// JSON text could not be parsed or produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A message does not have the expected shape.
    #[error("malformed message: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// A required field is absent or has the wrong type.
    #[error("missing or invalid field `{field}`")]
    MissingField {
        /// Field name.
        field: &'static str,
    },

    /// A change targets a node the client has never been told about.
    #[error("unknown node {id}")]
    UnknownNode {
        /// The node id.
        id: u32,
    },

    /// A change names a feature id outside the registry.
    #[error("unknown feature {feat}")]
    UnknownFeature {
        /// The feature id.
        feat: u8,
    },

    /// A change does not fit the shape of its feature.
    #[error("{kind} cannot be applied to {feature}")]
    ShapeMismatch {
        /// The change type.
        kind: String,
        /// The feature wire key.
        feature: &'static str,
    },

    /// A list index is out of range on the client.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The list length.
        len: usize,
    },
}

impl ProtocolError {
    /// Creates a malformed message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Whether the error comes from the shape of an inbound message rather
    /// than from client state.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ProtocolError::Malformed { .. }
                | ProtocolError::MissingField { .. }
                | ProtocolError::Json(_)
                | ProtocolError::Codec(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::MissingField { field: "node" };
        assert_eq!(err.to_string(), "missing or invalid field `node`");
        assert!(err.is_structural());

        let err = ProtocolError::UnknownNode { id: 4 };
        assert!(!err.is_structural());
    }
}
