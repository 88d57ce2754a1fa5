//! State nodes.

use crate::change::ChangeRecord;
use crate::feature::{Feature, FeatureKind, FeatureSet};
use crate::types::{NodeId, NodeKey};
use std::collections::BTreeMap;

/// A node in a tree's arena.
///
/// Nodes are created detached. They get an id when they become reachable
/// from the tree's root and lose it when they are detached again.
#[derive(Debug, Clone)]
pub struct StateNode {
    pub(crate) key: NodeKey,
    pub(crate) id: Option<NodeId>,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) declared: FeatureSet,
    pub(crate) features: BTreeMap<FeatureKind, Feature>,
    pub(crate) queue: Vec<ChangeRecord>,
    pub(crate) dirty: bool,
    pub(crate) removed: bool,
    /// The client received at least one payload while this node had its
    /// current id.
    pub(crate) seen: bool,
}

impl StateNode {
    pub(crate) fn new(key: NodeKey, declared: FeatureSet) -> Self {
        Self {
            key,
            id: None,
            parent: None,
            declared,
            features: BTreeMap::new(),
            queue: Vec::new(),
            dirty: false,
            removed: false,
            seen: false,
        }
    }

    /// Arena handle.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Wire id, while registered.
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    /// Whether the node is connected to its tree's root.
    pub fn is_registered(&self) -> bool {
        self.id.is_some()
    }

    /// The node owning this one through a feature slot.
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Kinds declared at creation.
    pub fn declared(&self) -> FeatureSet {
        self.declared
    }

    /// Whether changes are queued for the next flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the node was detached since the last flush.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// An instantiated feature.
    pub fn feature(&self, kind: FeatureKind) -> Option<&Feature> {
        self.features.get(&kind)
    }

    /// Queued records, oldest first.
    pub fn queued(&self) -> &[ChangeRecord] {
        &self.queue
    }

    pub(crate) fn feature_or_insert(&mut self, kind: FeatureKind) -> Option<&mut Feature> {
        if !self.declared.contains(kind) {
            return None;
        }
        if !self.features.contains_key(&kind) {
            self.features.insert(kind, Feature::empty(kind)?);
        }
        self.features.get_mut(&kind)
    }

    /// Owned children in feature order, then slot order.
    pub(crate) fn children(&self) -> Vec<NodeKey> {
        use crate::feature::NodeFeature;
        let mut out = Vec::new();
        for feature in self.features.values() {
            feature.for_each_child(&mut |child| out.push(child));
        }
        out
    }
}
