//! Reference client model.
//!
//! Replays wire changes the way a browser-side client would and renders the
//! resulting document as JSON. Used by tests to check that an optimized log
//! reaches the same state as the raw one, and by the CLI to inspect payloads.

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{ChangeType, EncodedPayload, WireChange};
use serde_json::{json, Map};
use statesync_core::feature::{descriptor, FeatureDescriptor, FeatureShape};
use statesync_core::{FeatureId, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Key under which rendered nodes carry their id.
pub const ID_KEY: &str = "@id";

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Value(serde_json::Value),
    Node(u32),
}

#[derive(Debug, Clone, PartialEq)]
enum ClientFeature {
    Map(BTreeMap<String, Slot>),
    List(Vec<Slot>),
}

impl ClientFeature {
    fn is_empty(&self) -> bool {
        match self {
            ClientFeature::Map(map) => map.is_empty(),
            ClientFeature::List(list) => list.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ClientNode {
    features: HashMap<u8, ClientFeature>,
}

/// Client-side mirror of a state tree.
#[derive(Debug, Clone)]
pub struct ClientModel {
    strict: bool,
    nodes: HashMap<u32, ClientNode>,
    last_sync_id: Option<u64>,
}

impl Default for ClientModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientModel {
    /// Creates a lenient model that creates unknown nodes on first use.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::DOCUMENT.as_u32(), ClientNode::default());
        Self {
            strict: false,
            nodes,
            last_sync_id: None,
        }
    }

    /// Creates a model that rejects changes targeting a node it has not been
    /// told about.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    /// Whether unknown targets are rejected.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Sync id of the last payload applied.
    pub fn last_sync_id(&self) -> Option<u64> {
        self.last_sync_id
    }

    /// Number of nodes known to the client, the document included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `id` is known.
    pub fn is_known(&self, id: u32) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Applies a numbered payload.
    ///
    /// Returns `false` when the payload was already applied, which happens
    /// when the server resends after a transport failure.
    pub fn apply_payload(&mut self, payload: &EncodedPayload) -> ProtocolResult<bool> {
        if self.last_sync_id.is_some_and(|last| payload.sync_id <= last) {
            debug!(sync_id = payload.sync_id, "skipping payload already applied");
            return Ok(false);
        }
        self.apply(&payload.changes)?;
        self.last_sync_id = Some(payload.sync_id);
        Ok(true)
    }

    /// Applies changes in order.
    pub fn apply(&mut self, changes: &[WireChange]) -> ProtocolResult<()> {
        changes.iter().try_for_each(|change| self.apply_change(change))
    }

    /// Applies one change.
    pub fn apply_change(&mut self, change: &WireChange) -> ProtocolResult<()> {
        let descriptor = descriptor(FeatureId(change.feat))
            .ok_or(ProtocolError::UnknownFeature { feat: change.feat })?;
        if !self.nodes.contains_key(&change.id) {
            if self.strict {
                return Err(ProtocolError::UnknownNode { id: change.id });
            }
            self.nodes.insert(change.id, ClientNode::default());
        }

        let mut referenced = Vec::new();
        if change.kind.carries_nodes() {
            collect_refs(change, &mut referenced)?;
        }
        for id in &referenced {
            self.nodes.entry(*id).or_default();
        }

        let node = self
            .nodes
            .get_mut(&change.id)
            .ok_or(ProtocolError::UnknownNode { id: change.id })?;
        let feature = node
            .features
            .entry(change.feat)
            .or_insert_with(|| match descriptor.shape {
                FeatureShape::Map => ClientFeature::Map(BTreeMap::new()),
                FeatureShape::List => ClientFeature::List(Vec::new()),
            });
        match feature {
            ClientFeature::Map(map) => apply_map(map, change, descriptor),
            ClientFeature::List(list) => apply_list(list, change, descriptor),
        }
    }

    /// Renders the document reachable from node `0`.
    ///
    /// Map keys come out sorted and empty features are omitted, so two
    /// models holding the same state render identically whatever order
    /// the changes arrived in.
    pub fn render(&self) -> serde_json::Value {
        self.render_node(NodeId::DOCUMENT.as_u32())
    }

    /// Renders the subtree of `id`, or `null` when it is unknown.
    pub fn render_node(&self, id: u32) -> serde_json::Value {
        let mut path = BTreeSet::new();
        self.render_inner(id, &mut path)
    }

    /// A map entry holding a plain value.
    pub fn map_value(&self, id: u32, feat: u8, key: &str) -> Option<&serde_json::Value> {
        match self.feature(id, feat)? {
            ClientFeature::Map(map) => match map.get(key)? {
                Slot::Value(value) => Some(value),
                Slot::Node(_) => None,
            },
            ClientFeature::List(_) => None,
        }
    }

    /// A map entry holding a node.
    pub fn map_node(&self, id: u32, feat: u8, key: &str) -> Option<u32> {
        match self.feature(id, feat)? {
            ClientFeature::Map(map) => match map.get(key)? {
                Slot::Node(node) => Some(*node),
                Slot::Value(_) => None,
            },
            ClientFeature::List(_) => None,
        }
    }

    /// Node ids held by a list feature.
    pub fn list_nodes(&self, id: u32, feat: u8) -> Vec<u32> {
        match self.feature(id, feat) {
            Some(ClientFeature::List(list)) => list
                .iter()
                .filter_map(|slot| match slot {
                    Slot::Node(node) => Some(*node),
                    Slot::Value(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Plain values held by a list feature.
    pub fn list_values(&self, id: u32, feat: u8) -> Vec<serde_json::Value> {
        match self.feature(id, feat) {
            Some(ClientFeature::List(list)) => list
                .iter()
                .filter_map(|slot| match slot {
                    Slot::Value(value) => Some(value.clone()),
                    Slot::Node(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn feature(&self, id: u32, feat: u8) -> Option<&ClientFeature> {
        self.nodes.get(&id)?.features.get(&feat)
    }

    fn render_inner(&self, id: u32, path: &mut BTreeSet<u32>) -> serde_json::Value {
        let Some(node) = self.nodes.get(&id) else {
            return serde_json::Value::Null;
        };
        // A node reached again through its own subtree renders as a bare id.
        if !path.insert(id) {
            let mut bare = Map::new();
            bare.insert(ID_KEY.to_string(), json!(id));
            return serde_json::Value::Object(bare);
        }

        let mut entries: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        entries.insert(ID_KEY.to_string(), json!(id));
        for (feat, feature) in &node.features {
            if feature.is_empty() {
                continue;
            }
            let Some(descriptor) = descriptor(FeatureId(*feat)) else {
                continue;
            };
            let rendered = match feature {
                ClientFeature::Map(map) => {
                    let mut object = Map::new();
                    for (key, slot) in map {
                        object.insert(key.clone(), self.render_slot(slot, path));
                    }
                    serde_json::Value::Object(object)
                }
                ClientFeature::List(list) => serde_json::Value::Array(
                    list.iter().map(|slot| self.render_slot(slot, path)).collect(),
                ),
            };
            entries.insert(descriptor.wire_key.to_string(), rendered);
        }
        path.remove(&id);
        serde_json::Value::Object(entries.into_iter().collect())
    }

    fn render_slot(&self, slot: &Slot, path: &mut BTreeSet<u32>) -> serde_json::Value {
        match slot {
            Slot::Value(value) => value.clone(),
            Slot::Node(node) => self.render_inner(*node, path),
        }
    }
}

fn node_id(value: &serde_json::Value) -> ProtocolResult<u32> {
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| ProtocolError::malformed(format!("expected a node id, got {value}")))
}

fn collect_refs(change: &WireChange, out: &mut Vec<u32>) -> ProtocolResult<()> {
    let value = change
        .value
        .as_ref()
        .ok_or(ProtocolError::MissingField { field: "value" })?;
    match change.kind {
        ChangeType::ListInsertNodes => {
            let items = value
                .as_array()
                .ok_or(ProtocolError::MissingField { field: "value" })?;
            for item in items {
                out.push(node_id(item)?);
            }
        }
        _ => out.push(node_id(value)?),
    }
    Ok(())
}

fn mismatch(change: &WireChange, descriptor: &FeatureDescriptor) -> ProtocolError {
    ProtocolError::ShapeMismatch {
        kind: change.kind.as_str().to_string(),
        feature: descriptor.wire_key,
    }
}

fn required_value(change: &WireChange) -> ProtocolResult<&serde_json::Value> {
    change
        .value
        .as_ref()
        .ok_or(ProtocolError::MissingField { field: "value" })
}

fn required_index(change: &WireChange) -> ProtocolResult<usize> {
    change.index.ok_or(ProtocolError::MissingField { field: "index" })
}

fn apply_map(
    map: &mut BTreeMap<String, Slot>,
    change: &WireChange,
    descriptor: &FeatureDescriptor,
) -> ProtocolResult<()> {
    match change.kind {
        ChangeType::Put => {
            map.insert(change.key.clone(), Slot::Value(required_value(change)?.clone()));
        }
        ChangeType::PutNode => {
            map.insert(change.key.clone(), Slot::Node(node_id(required_value(change)?)?));
        }
        ChangeType::Remove => {
            map.remove(&change.key);
        }
        _ => return Err(mismatch(change, descriptor)),
    }
    Ok(())
}

fn apply_list(
    list: &mut Vec<Slot>,
    change: &WireChange,
    descriptor: &FeatureDescriptor,
) -> ProtocolResult<()> {
    let insert = |list: &mut Vec<Slot>, index: usize, slots: Vec<Slot>| {
        if index > list.len() {
            return Err(ProtocolError::IndexOutOfBounds {
                index,
                len: list.len(),
            });
        }
        list.splice(index..index, slots);
        Ok(())
    };
    match change.kind {
        ChangeType::ListInsert => {
            let slot = Slot::Value(required_value(change)?.clone());
            insert(list, required_index(change)?, vec![slot])
        }
        ChangeType::ListInsertNode => {
            let slot = Slot::Node(node_id(required_value(change)?)?);
            insert(list, required_index(change)?, vec![slot])
        }
        ChangeType::ListInsertMany => {
            let items = required_value(change)?
                .as_array()
                .ok_or(ProtocolError::MissingField { field: "value" })?;
            let slots = items.iter().cloned().map(Slot::Value).collect();
            insert(list, required_index(change)?, slots)
        }
        ChangeType::ListInsertNodes => {
            let items = required_value(change)?
                .as_array()
                .ok_or(ProtocolError::MissingField { field: "value" })?;
            let slots = items
                .iter()
                .map(|item| node_id(item).map(Slot::Node))
                .collect::<ProtocolResult<_>>()?;
            insert(list, required_index(change)?, slots)
        }
        ChangeType::ListRemove => {
            let index = required_index(change)?;
            if index >= list.len() {
                return Err(ProtocolError::IndexOutOfBounds {
                    index,
                    len: list.len(),
                });
            }
            list.remove(index);
            Ok(())
        }
        ChangeType::ListClear => {
            list.clear();
            Ok(())
        }
        _ => Err(mismatch(change, descriptor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(
        id: u32,
        kind: ChangeType,
        feat: u8,
        key: &str,
        index: Option<usize>,
        value: Option<serde_json::Value>,
    ) -> WireChange {
        WireChange {
            id,
            kind,
            feat,
            key: key.to_string(),
            index,
            value,
        }
    }

    #[test]
    fn renders_root_with_properties() {
        let mut model = ClientModel::strict();
        model
            .apply(&[
                change(0, ChangeType::PutNode, 0, "root", None, Some(json!(1))),
                change(1, ChangeType::Put, 2, "value", None, Some(json!(0.0))),
                change(1, ChangeType::Put, 2, "alpha", None, Some(json!("a"))),
            ])
            .unwrap();

        let rendered = model.render();
        assert_eq!(
            rendered,
            json!({"@id": 0, "document": {"root": {
                "@id": 1,
                "properties": {"alpha": "a", "value": 0.0}
            }}})
        );
        assert_eq!(model.map_node(0, 0, "root"), Some(1));
        assert_eq!(model.map_value(1, 2, "value"), Some(&json!(0.0)));
    }

    #[test]
    fn strict_model_rejects_unknown_targets() {
        let mut model = ClientModel::strict();
        let err = model
            .apply_change(&change(5, ChangeType::Put, 2, "x", None, Some(json!(1))))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownNode { id: 5 }));

        let mut lenient = ClientModel::new();
        lenient
            .apply_change(&change(5, ChangeType::Put, 2, "x", None, Some(json!(1))))
            .unwrap();
        assert!(lenient.is_known(5));
    }

    #[test]
    fn list_operations() {
        let mut model = ClientModel::strict();
        model
            .apply(&[
                change(0, ChangeType::PutNode, 0, "root", None, Some(json!(1))),
                change(1, ChangeType::ListInsertNodes, 3, "children", Some(0), Some(json!([2, 3]))),
                change(1, ChangeType::ListInsertNode, 3, "children", Some(1), Some(json!(4))),
                change(1, ChangeType::ListRemove, 3, "children", Some(0), None),
            ])
            .unwrap();
        assert_eq!(model.list_nodes(1, 3), vec![4, 3]);

        model
            .apply_change(&change(1, ChangeType::ListClear, 3, "children", None, None))
            .unwrap();
        assert!(model.list_nodes(1, 3).is_empty());

        let err = model
            .apply_change(&change(1, ChangeType::ListRemove, 3, "children", Some(0), None))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::IndexOutOfBounds { index: 0, len: 0 }));
    }

    #[test]
    fn shape_and_feature_errors() {
        let mut model = ClientModel::new();
        let err = model
            .apply_change(&change(0, ChangeType::ListClear, 2, "properties", None, None))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ShapeMismatch { feature: "properties", .. }));

        let err = model
            .apply_change(&change(0, ChangeType::Put, 42, "x", None, Some(json!(1))))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownFeature { feat: 42 }));
    }

    #[test]
    fn resent_payloads_are_skipped() {
        let mut model = ClientModel::new();
        let payload = EncodedPayload::new(
            1,
            vec![change(0, ChangeType::PutNode, 0, "root", None, Some(json!(1)))],
        );
        assert!(model.apply_payload(&payload).unwrap());
        assert!(!model.apply_payload(&payload).unwrap());
        assert_eq!(model.last_sync_id(), Some(1));
    }

    #[test]
    fn empty_features_render_as_absent() {
        let mut a = ClientModel::new();
        a.apply(&[
            change(0, ChangeType::PutNode, 0, "root", None, Some(json!(1))),
            change(1, ChangeType::ListInsertNode, 3, "children", Some(0), Some(json!(2))),
            change(1, ChangeType::ListRemove, 3, "children", Some(0), None),
        ])
        .unwrap();
        let mut b = ClientModel::new();
        b.apply(&[change(0, ChangeType::PutNode, 0, "root", None, Some(json!(1)))])
            .unwrap();
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn self_reference_does_not_recurse() {
        let mut model = ClientModel::new();
        model
            .apply(&[
                change(0, ChangeType::PutNode, 0, "root", None, Some(json!(1))),
                change(1, ChangeType::PutNode, 2, "me", None, Some(json!(1))),
            ])
            .unwrap();
        assert_eq!(
            model.render_node(1),
            json!({"@id": 1, "properties": {"me": {"@id": 1}}})
        );
    }
}
