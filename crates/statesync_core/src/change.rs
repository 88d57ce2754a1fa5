//! Raw change records produced by feature mutations.

use crate::feature::{FeatureId, FeatureShape};
use crate::types::NodeId;
use statesync_codec::Value;
use std::fmt;

/// Tag of a change record, as it appears in the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Map entry set to a value.
    Put,
    /// Map entry set to a node.
    PutNode,
    /// Map entry removed.
    Remove,
    /// One value inserted into a list.
    ListInsert,
    /// One node inserted into a list.
    ListInsertNode,
    /// Several values inserted into a list.
    ListInsertMany,
    /// Several nodes inserted into a list.
    ListInsertNodes,
    /// One list element removed.
    ListRemove,
    /// List emptied.
    ListClear,
}

impl ChangeKind {
    /// All kinds.
    pub const ALL: [ChangeKind; 9] = [
        ChangeKind::Put,
        ChangeKind::PutNode,
        ChangeKind::Remove,
        ChangeKind::ListInsert,
        ChangeKind::ListInsertNode,
        ChangeKind::ListInsertMany,
        ChangeKind::ListInsertNodes,
        ChangeKind::ListRemove,
        ChangeKind::ListClear,
    ];

    /// The wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Put => "put",
            ChangeKind::PutNode => "putNode",
            ChangeKind::Remove => "remove",
            ChangeKind::ListInsert => "listInsert",
            ChangeKind::ListInsertNode => "listInsertNode",
            ChangeKind::ListInsertMany => "listInsertMany",
            ChangeKind::ListInsertNodes => "listInsertNodes",
            ChangeKind::ListRemove => "listRemove",
            ChangeKind::ListClear => "listClear",
        }
    }

    /// Whether records of this kind address a list.
    pub fn is_list(self) -> bool {
        !matches!(self, ChangeKind::Put | ChangeKind::PutNode | ChangeKind::Remove)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a change record.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Set a map entry to a scalar value.
    Put {
        /// Entry name.
        key: String,
        /// New value.
        value: Value,
    },
    /// Set a map entry to a node.
    PutNode {
        /// Entry name.
        key: String,
        /// The child node.
        node: NodeId,
    },
    /// Remove a map entry.
    Remove {
        /// Entry name.
        key: String,
    },
    /// Insert one scalar at `index`.
    ListInsert {
        /// Insert position.
        index: usize,
        /// Inserted value.
        value: Value,
    },
    /// Insert one node at `index`.
    ListInsertNode {
        /// Insert position.
        index: usize,
        /// Inserted child.
        node: NodeId,
    },
    /// Insert consecutive scalars starting at `index`.
    ListInsertMany {
        /// Insert position.
        index: usize,
        /// Inserted values.
        values: Vec<Value>,
    },
    /// Insert consecutive nodes starting at `index`.
    ListInsertNodes {
        /// Insert position.
        index: usize,
        /// Inserted children.
        nodes: Vec<NodeId>,
    },
    /// Remove the element at `index`.
    ListRemove {
        /// Removed position.
        index: usize,
    },
    /// Remove every element.
    ListClear,
}

impl Change {
    /// The record tag.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Put { .. } => ChangeKind::Put,
            Change::PutNode { .. } => ChangeKind::PutNode,
            Change::Remove { .. } => ChangeKind::Remove,
            Change::ListInsert { .. } => ChangeKind::ListInsert,
            Change::ListInsertNode { .. } => ChangeKind::ListInsertNode,
            Change::ListInsertMany { .. } => ChangeKind::ListInsertMany,
            Change::ListInsertNodes { .. } => ChangeKind::ListInsertNodes,
            Change::ListRemove { .. } => ChangeKind::ListRemove,
            Change::ListClear => ChangeKind::ListClear,
        }
    }

    /// The entry name for map records.
    pub fn map_key(&self) -> Option<&str> {
        match self {
            Change::Put { key, .. } | Change::PutNode { key, .. } | Change::Remove { key } => {
                Some(key)
            }
            _ => None,
        }
    }

    /// The list position for list records other than clear.
    pub fn index(&self) -> Option<usize> {
        match self {
            Change::ListInsert { index, .. }
            | Change::ListInsertNode { index, .. }
            | Change::ListInsertMany { index, .. }
            | Change::ListInsertNodes { index, .. }
            | Change::ListRemove { index } => Some(*index),
            _ => None,
        }
    }

    /// Node ids this record introduces to the client.
    pub fn referenced_nodes(&self) -> &[NodeId] {
        match self {
            Change::PutNode { node, .. } | Change::ListInsertNode { node, .. } => {
                std::slice::from_ref(node)
            }
            Change::ListInsertNodes { nodes, .. } => nodes,
            _ => &[],
        }
    }
}

/// One raw mutation of one feature of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Target node.
    pub node: NodeId,
    /// Target feature.
    pub feature: FeatureId,
    /// What changed.
    pub change: Change,
}

impl ChangeRecord {
    /// Creates a record.
    pub fn new(node: NodeId, feature: FeatureId, change: Change) -> Self {
        Self {
            node,
            feature,
            change,
        }
    }

    /// The record key: the entry name for maps, the feature wire key for lists.
    pub fn key(&self) -> &str {
        match self.change.map_key() {
            Some(key) => key,
            None => self
                .feature
                .descriptor()
                .map(|d| d.wire_key)
                .unwrap_or_default(),
        }
    }

    /// Whether the record's feature is declared as a list.
    pub fn targets_list(&self) -> bool {
        self.feature
            .descriptor()
            .map(|d| d.shape == FeatureShape::List)
            .unwrap_or_else(|| self.change.kind().is_list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureKind;

    #[test]
    fn list_records_use_feature_key() {
        let record = ChangeRecord::new(
            NodeId(3),
            FeatureKind::Children.id(),
            Change::ListRemove { index: 0 },
        );
        assert_eq!(record.key(), "children");
        assert!(record.targets_list());

        let record = ChangeRecord::new(
            NodeId(3),
            FeatureKind::Properties.id(),
            Change::Remove { key: "value".into() },
        );
        assert_eq!(record.key(), "value");
        assert!(!record.targets_list());
    }

    #[test]
    fn kind_names() {
        assert_eq!(ChangeKind::ListInsertNodes.as_str(), "listInsertNodes");
        assert!(ChangeKind::ListClear.is_list());
        assert!(!ChangeKind::PutNode.is_list());
        for kind in ChangeKind::ALL {
            assert!(!kind.as_str().is_empty());
        }
    }

    #[test]
    fn referenced_nodes() {
        let change = Change::ListInsertNodes {
            index: 0,
            nodes: vec![NodeId(4), NodeId(5)],
        };
        assert_eq!(change.referenced_nodes(), &[NodeId(4), NodeId(5)]);
        assert!(Change::ListClear.referenced_nodes().is_empty());
    }
}
