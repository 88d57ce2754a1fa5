//! Core type definitions for the state tree.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Wire identifier of a node.
///
/// Ids are assigned when a node is first connected to a tree's root and are
/// never reused within that tree. Id `0` is the document pseudo node which
/// the client always knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The document pseudo node.
    pub const DOCUMENT: NodeId = NodeId(0);

    /// Creates a new node ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true for the document pseudo node.
    #[must_use]
    pub const fn is_document(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Identifier of a tree instance, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeId(pub u64);

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

impl TreeId {
    /// Allocates a fresh tree ID.
    pub fn next() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree:{}", self.0)
    }
}

/// Handle to a node in a tree's arena.
///
/// A key stays valid after the node is detached, until the node is
/// released. Unlike a [`NodeId`] it exists from the moment the node is
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub(crate) tree: TreeId,
    pub(crate) slot: u64,
}

impl NodeKey {
    /// The tree whose arena holds this node.
    #[must_use]
    pub const fn tree(self) -> TreeId {
        self.tree
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}/{}", self.tree.0, self.slot)
    }
}

/// Result of looking a node up by wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The id refers to a registered node.
    Found(NodeKey),
    /// The id is unknown or its node has been detached.
    NotFound,
}

impl Lookup {
    /// Converts to an option.
    pub fn found(self) -> Option<NodeKey> {
        match self {
            Lookup::Found(key) => Some(key),
            Lookup::NotFound => None,
        }
    }
}
