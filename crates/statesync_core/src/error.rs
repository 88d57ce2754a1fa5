//! Error types for the state tree.

use crate::feature::FeatureKind;
use crate::types::{NodeKey, TreeId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while mutating or inspecting a state tree.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] statesync_codec::CodecError),

    /// The node lives in another tree's arena.
    #[error("node {node} belongs to tree {owner}, not {tree}")]
    AlreadyAttached {
        /// The node being attached.
        node: NodeKey,
        /// The tree that owns it.
        owner: TreeId,
        /// The tree it was offered to.
        tree: TreeId,
    },

    /// The node already sits in a parent slot (or is the root).
    #[error("node {node} already has a parent")]
    AlreadyHasParent {
        /// The node being attached.
        node: NodeKey,
    },

    /// Attaching would make a node its own ancestor.
    #[error("attaching {node} under {parent} would create a cycle")]
    CyclicAttach {
        /// The node being attached.
        node: NodeKey,
        /// The requested parent.
        parent: NodeKey,
    },

    /// The handle does not refer to a live node in this tree.
    #[error("node not found: {node}")]
    NodeNotFound {
        /// The unknown handle.
        node: NodeKey,
    },

    /// The node did not declare the feature at creation.
    #[error("node {node} has no {kind:?} feature")]
    MissingFeature {
        /// The node that was accessed.
        node: NodeKey,
        /// The requested feature.
        kind: FeatureKind,
    },

    /// A list index is out of range.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The list length.
        len: usize,
    },

    /// The tree already has a root node.
    #[error("tree already has a root node")]
    RootAlreadySet,

    /// No node ids are left in this tree.
    #[error("node id space exhausted")]
    IdSpaceExhausted,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The log optimizer found records it cannot reconcile.
    #[error("optimizer invariant violated: {message}")]
    OptimizerInvariant {
        /// Description of the violation.
        message: String,
    },

    /// A listener or callback reported a failure.
    #[error("handler failed: {message}")]
    HandlerFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an optimizer invariant error.
    pub fn optimizer(message: impl Into<String>) -> Self {
        Self::OptimizerInvariant {
            message: message.into(),
        }
    }

    /// Creates a handler failure, typically returned from a listener.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            message: message.into(),
        }
    }
}
