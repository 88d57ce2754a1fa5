//! Outbound wire types.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};
use statesync_core::ChangeKind;

/// The `type` field of a wire change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    /// Map entry set to a value.
    Put,
    /// Map entry set to a node id.
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

impl ChangeType {
    /// The wire name.
    pub fn as_str(self) -> &'static str {
        ChangeKind::from(self).as_str()
    }

    /// Whether the `value` field holds node ids.
    pub fn carries_nodes(self) -> bool {
        matches!(
            self,
            ChangeType::PutNode | ChangeType::ListInsertNode | ChangeType::ListInsertNodes
        )
    }
}

impl From<ChangeKind> for ChangeType {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Put => ChangeType::Put,
            ChangeKind::PutNode => ChangeType::PutNode,
            ChangeKind::Remove => ChangeType::Remove,
            ChangeKind::ListInsert => ChangeType::ListInsert,
            ChangeKind::ListInsertNode => ChangeType::ListInsertNode,
            ChangeKind::ListInsertMany => ChangeType::ListInsertMany,
            ChangeKind::ListInsertNodes => ChangeType::ListInsertNodes,
            ChangeKind::ListRemove => ChangeType::ListRemove,
            ChangeKind::ListClear => ChangeType::ListClear,
        }
    }
}

impl From<ChangeType> for ChangeKind {
    fn from(kind: ChangeType) -> Self {
        match kind {
            ChangeType::Put => ChangeKind::Put,
            ChangeType::PutNode => ChangeKind::PutNode,
            ChangeType::Remove => ChangeKind::Remove,
            ChangeType::ListInsert => ChangeKind::ListInsert,
            ChangeType::ListInsertNode => ChangeKind::ListInsertNode,
            ChangeType::ListInsertMany => ChangeKind::ListInsertMany,
            ChangeType::ListInsertNodes => ChangeKind::ListInsertNodes,
            ChangeType::ListRemove => ChangeKind::ListRemove,
            ChangeType::ListClear => ChangeKind::ListClear,
        }
    }
}

/// One entry of an outbound payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireChange {
    /// Target node id.
    pub id: u32,
    /// Change type.
    #[serde(rename = "type")]
    pub kind: ChangeType,
    /// Feature id.
    pub feat: u8,
    /// Entry name for maps, feature wire key for lists.
    pub key: String,
    /// List position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Scalar, node id, or array of either.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// A numbered outbound payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedPayload {
    /// Position of this payload in the session's outbound sequence.
    #[serde(rename = "syncId")]
    pub sync_id: u64,
    /// Changes in apply order.
    pub changes: Vec<WireChange>,
}

impl EncodedPayload {
    /// Creates a payload.
    pub fn new(sync_id: u64, changes: Vec<WireChange>) -> Self {
        Self { sync_id, changes }
    }

    /// The full payload as JSON text.
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Only the change array as JSON text.
    pub fn changes_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(&self.changes)?)
    }

    /// Parses a payload from JSON text.
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the payload carries no change.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
