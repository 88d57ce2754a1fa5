//! Turns transaction logs into wire changes.

use crate::wire::{ChangeType, EncodedPayload, WireChange};
use serde_json::json;
use statesync_codec::{to_json_with, NonFinitePolicy, Value};
use statesync_core::{Change, ChangeRecord, NodeId, TransactionLog};
use tracing::warn;

/// Encodes every record of `log`, in log order.
pub fn encode(log: &TransactionLog) -> Vec<WireChange> {
    log.records().map(encode_record).collect()
}

/// Encodes `log` as a numbered payload.
pub fn encode_payload(sync_id: u64, log: &TransactionLog) -> EncodedPayload {
    EncodedPayload::new(sync_id, encode(log))
}

/// Encodes one record.
pub fn encode_record(record: &ChangeRecord) -> WireChange {
    let (index, value) = match &record.change {
        Change::Put { value, .. } => (None, Some(scalar(record, value))),
        Change::PutNode { node, .. } => (None, Some(node_ref(*node))),
        Change::Remove { .. } | Change::ListClear => (None, None),
        Change::ListInsert { index, value } => (Some(*index), Some(scalar(record, value))),
        Change::ListInsertNode { index, node } => (Some(*index), Some(node_ref(*node))),
        Change::ListInsertMany { index, values } => (
            Some(*index),
            Some(serde_json::Value::Array(
                values.iter().map(|v| scalar(record, v)).collect(),
            )),
        ),
        Change::ListInsertNodes { index, nodes } => (
            Some(*index),
            Some(serde_json::Value::Array(
                nodes.iter().map(|n| node_ref(*n)).collect(),
            )),
        ),
        Change::ListRemove { index } => (Some(*index), None),
    };
    WireChange {
        id: record.node.as_u32(),
        kind: ChangeType::from(record.change.kind()),
        feat: record.feature.as_u8(),
        key: record.key().to_string(),
        index,
        value,
    }
}

fn node_ref(node: NodeId) -> serde_json::Value {
    json!(node.as_u32())
}

fn scalar(record: &ChangeRecord, value: &Value) -> serde_json::Value {
    if value.has_non_finite() {
        warn!(
            node = record.node.as_u32(),
            key = record.key(),
            "non-finite float encoded as null"
        );
    }
    // The lenient policy cannot fail.
    to_json_with(value, NonFinitePolicy::Null).unwrap_or(serde_json::Value::Null)
}
