//! The state tree: node arena, id assignment and attach/detach lifecycle.

use crate::attach::PendingAttach;
use crate::change::{Change, ChangeRecord};
use crate::error::{CoreError, CoreResult};
use crate::feature::{
    ChildList, ElementData, Feature, FeatureKind, FeatureSet, NodeFeature, PropertyMap,
    PropertyValue,
};
use crate::node::StateNode;
use crate::tracker::ChangeTracker;
use crate::types::{Lookup, NodeId, NodeKey, TreeId};
use std::collections::{BTreeMap, HashMap};

/// Key of the document slot holding the root node.
pub const ROOT_KEY: &str = "root";

const MAX_NODE_ID: u64 = u32::MAX as u64;

/// Owns every node of one synchronized document.
///
/// Nodes live in an arena addressed by [`NodeKey`]. A node gets a wire
/// [`NodeId`] when it becomes reachable from the root; ids come from a
/// monotonic counter and are never handed out twice.
#[derive(Debug)]
pub struct StateTree {
    id: TreeId,
    pub(crate) nodes: HashMap<u64, StateNode>,
    next_slot: u64,
    by_id: HashMap<NodeId, NodeKey>,
    next_id: u64,
    pub(crate) root: Option<NodeKey>,
    pub(crate) tracker: ChangeTracker,
    next_listener: u64,
    pub(crate) pending_attach: HashMap<NodeKey, PendingAttach>,
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            id: TreeId::next(),
            nodes: HashMap::new(),
            next_slot: 0,
            by_id: HashMap::new(),
            next_id: 1,
            root: None,
            tracker: ChangeTracker::default(),
            next_listener: 1,
            pending_attach: HashMap::new(),
        }
    }

    /// This tree's id.
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// The root node, if attached.
    pub fn root(&self) -> Option<NodeKey> {
        self.root
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes connected to the root.
    pub fn registered_count(&self) -> usize {
        self.by_id.len()
    }

    /// A node by handle.
    pub fn node(&self, key: NodeKey) -> Option<&StateNode> {
        if key.tree != self.id {
            return None;
        }
        self.nodes.get(&key.slot)
    }

    /// Wire id of a node, while registered.
    pub fn node_id(&self, key: NodeKey) -> Option<NodeId> {
        self.node(key).and_then(StateNode::id)
    }

    /// Parent of a node.
    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.node(key).and_then(StateNode::parent)
    }

    /// Whether a node is connected to the root.
    pub fn is_registered(&self, key: NodeKey) -> bool {
        self.node_id(key).is_some()
    }

    /// Looks up a registered node by wire id.
    pub fn get_by_id(&self, id: NodeId) -> Lookup {
        match self.by_id.get(&id) {
            Some(key) => Lookup::Found(*key),
            None => Lookup::NotFound,
        }
    }

    /// Creates a detached element node with every element feature declared.
    pub fn create_element(&mut self, tag: &str) -> NodeKey {
        let key = self.insert_node(FeatureSet::element());
        if let Some(node) = self.nodes.get_mut(&key.slot) {
            node.features.insert(
                FeatureKind::ElementData,
                Feature::ElementData(ElementData::with_tag(tag)),
            );
        }
        key
    }

    /// Creates a detached node declaring exactly `kinds`.
    pub fn create_node(&mut self, kinds: &[FeatureKind]) -> CoreResult<NodeKey> {
        if kinds.contains(&FeatureKind::Document) {
            return Err(CoreError::invalid_operation(
                "the document feature belongs to the document node only",
            ));
        }
        Ok(self.insert_node(FeatureSet::from_kinds(kinds)))
    }

    pub(crate) fn insert_node(&mut self, declared: FeatureSet) -> NodeKey {
        let key = NodeKey {
            tree: self.id,
            slot: self.next_slot,
        };
        self.next_slot += 1;
        self.nodes.insert(key.slot, StateNode::new(key, declared));
        key
    }

    pub(crate) fn node_ref(&self, key: NodeKey) -> CoreResult<&StateNode> {
        self.node(key).ok_or(CoreError::NodeNotFound { node: key })
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> CoreResult<&mut StateNode> {
        if key.tree != self.id {
            return Err(CoreError::NodeNotFound { node: key });
        }
        self.nodes
            .get_mut(&key.slot)
            .ok_or(CoreError::NodeNotFound { node: key })
    }

    /// An instantiated feature of a node.
    ///
    /// Fails with [`CoreError::MissingFeature`] if the node did not declare
    /// the kind; yields `None` if it is declared but was never touched.
    pub fn feature(&self, node: NodeKey, kind: FeatureKind) -> CoreResult<Option<&Feature>> {
        let state = self.node_ref(node)?;
        if !state.declared.contains(kind) {
            return Err(CoreError::MissingFeature { node, kind });
        }
        Ok(state.feature(kind))
    }

    /// A feature of a node, instantiated on first access.
    pub(crate) fn feature_mut(
        &mut self,
        node: NodeKey,
        kind: FeatureKind,
    ) -> CoreResult<&mut Feature> {
        self.node_mut(node)?
            .feature_or_insert(kind)
            .ok_or(CoreError::MissingFeature { node, kind })
    }

    pub(crate) fn next_listener_id(&mut self) -> crate::event::ListenerId {
        let id = crate::event::ListenerId(self.next_listener);
        self.next_listener += 1;
        id
    }

    /// Attaches `node` as the tree's root.
    ///
    /// The whole subtree is registered and the document learns the root
    /// through a `putNode` on its `root` slot.
    pub fn attach_root(&mut self, node: NodeKey) -> CoreResult<NodeId> {
        if self.root.is_some() {
            return Err(CoreError::RootAlreadySet);
        }
        self.check_free(node)?;
        self.ensure_id_space(&[node])?;
        self.root = Some(node);
        self.register_subtree(node);
        let id = self
            .node_id(node)
            .ok_or(CoreError::NodeNotFound { node })?;
        self.tracker.record_document(Change::PutNode {
            key: ROOT_KEY.to_string(),
            node: id,
        });
        Ok(id)
    }

    /// Appends `node` to `parent`'s children.
    ///
    /// Returns the node's id, or `None` when `parent` is itself not yet
    /// connected to the root. In that case the id is assigned once the
    /// parent's subtree is attached.
    pub fn attach(&mut self, node: NodeKey, parent: NodeKey) -> CoreResult<Option<NodeId>> {
        self.append_child(parent, node)?;
        Ok(self.node_id(node))
    }

    /// Detaches `node` from its parent slot (or from the document, for the
    /// root), together with its whole subtree.
    ///
    /// The parent records the matching removal. Detached nodes lose their
    /// ids and stay in the arena until [`release`](Self::release)d.
    /// Detaching a node that has no parent is a no-op.
    pub fn detach(&mut self, node: NodeKey) -> CoreResult<()> {
        let parent = self.node_ref(node)?.parent;
        match parent {
            Some(parent) => {
                self.unlink_from_parent(parent, node)?;
                self.orphan(node);
            }
            None if self.root == Some(node) => {
                self.root = None;
                self.tracker.record_document(Change::Remove {
                    key: ROOT_KEY.to_string(),
                });
                self.unregister_subtree(node);
            }
            None => {}
        }
        Ok(())
    }

    /// Drops a detached subtree from the arena. Returns the number of nodes
    /// released.
    pub fn release(&mut self, node: NodeKey) -> CoreResult<usize> {
        let state = self.node_ref(node)?;
        if state.parent.is_some() || self.root == Some(node) {
            return Err(CoreError::invalid_operation(format!(
                "{node} is still attached"
            )));
        }
        let keys = self.pre_order(node);
        for key in &keys {
            self.nodes.remove(&key.slot);
            self.tracker.forget(*key);
            self.pending_attach.remove(key);
        }
        Ok(keys.len())
    }

    /// Copies the feature state of `source`'s subtree into fresh detached
    /// nodes. Listeners are not copied.
    pub fn deep_copy(&mut self, source: NodeKey) -> CoreResult<NodeKey> {
        let (declared, features) = {
            let state = self.node_ref(source)?;
            (state.declared, state.features.clone())
        };
        let copy = self.insert_node(declared);
        let mut copied = BTreeMap::new();
        for (kind, feature) in features {
            let feature = match feature {
                Feature::Properties(map) => {
                    let mut out = PropertyMap::default();
                    for (name, value) in map.iter() {
                        let value = match value {
                            PropertyValue::Node(child) => {
                                PropertyValue::Node(self.copy_child(*child, copy)?)
                            }
                            other => other.clone(),
                        };
                        out.insert(name, value);
                    }
                    Feature::Properties(out)
                }
                Feature::Children(list) => Feature::Children(self.copy_children(&list, copy)?),
                Feature::VirtualChildren(list) => {
                    Feature::VirtualChildren(self.copy_children(&list, copy)?)
                }
                Feature::Listeners(_) => continue,
                other => other,
            };
            copied.insert(kind, feature);
        }
        self.node_mut(copy)?.features = copied;
        Ok(copy)
    }

    fn copy_child(&mut self, child: NodeKey, parent: NodeKey) -> CoreResult<NodeKey> {
        let copy = self.deep_copy(child)?;
        self.node_mut(copy)?.parent = Some(parent);
        Ok(copy)
    }

    fn copy_children(&mut self, list: &ChildList, parent: NodeKey) -> CoreResult<ChildList> {
        let mut keys = Vec::with_capacity(list.len());
        for child in list.as_slice() {
            keys.push(self.copy_child(*child, parent)?);
        }
        Ok(ChildList::from_keys(keys))
    }

    /// Visits `from` and its descendants pre-order: a node before its
    /// children, children in feature order then slot order.
    pub fn visit_pre_order(&self, from: NodeKey, mut visit: impl FnMut(&StateNode)) {
        for key in self.pre_order(from) {
            if let Some(node) = self.nodes.get(&key.slot) {
                visit(node);
            }
        }
    }

    pub(crate) fn pre_order(&self, from: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.get(&key.slot) {
                out.push(key);
                stack.extend(node.children().into_iter().rev());
            }
        }
        out
    }

    /// Checks that `node` may be placed in a slot of `parent`.
    pub(crate) fn check_attachable(&self, node: NodeKey, parent: NodeKey) -> CoreResult<()> {
        self.check_free(node)?;
        self.node_ref(parent)?;
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == node {
                return Err(CoreError::CyclicAttach { node, parent });
            }
            cursor = self.nodes.get(&current.slot).and_then(|n| n.parent);
        }
        Ok(())
    }

    fn check_free(&self, node: NodeKey) -> CoreResult<()> {
        if node.tree != self.id {
            return Err(CoreError::AlreadyAttached {
                node,
                owner: node.tree,
                tree: self.id,
            });
        }
        let state = self.node_ref(node)?;
        if state.parent.is_some() || self.root == Some(node) {
            return Err(CoreError::AlreadyHasParent { node });
        }
        Ok(())
    }

    /// Fails if registering the subtrees of `tops` would run out of ids.
    pub(crate) fn ensure_id_space(&self, tops: &[NodeKey]) -> CoreResult<()> {
        let needed: u64 = tops.iter().map(|t| self.pre_order(*t).len() as u64).sum();
        if self.next_id + needed > MAX_NODE_ID + 1 {
            return Err(CoreError::IdSpaceExhausted);
        }
        Ok(())
    }

    /// Links `node` under `parent`, registering it if the parent is
    /// registered. The caller has already placed it in a parent slot and
    /// checked id space.
    pub(crate) fn link(&mut self, node: NodeKey, parent: NodeKey) {
        let parent_registered = self.is_registered(parent);
        if let Some(state) = self.nodes.get_mut(&node.slot) {
            state.parent = Some(parent);
        }
        if parent_registered {
            self.register_subtree(node);
        }
    }

    /// Clears the parent link of a node already taken out of its slot.
    pub(crate) fn orphan(&mut self, node: NodeKey) {
        if let Some(state) = self.nodes.get_mut(&node.slot) {
            state.parent = None;
        }
        self.unregister_subtree(node);
    }

    fn unlink_from_parent(&mut self, parent: NodeKey, node: NodeKey) -> CoreResult<()> {
        let state = self.node_mut(parent)?;
        let mut removal = None;
        for (kind, feature) in state.features.iter_mut() {
            match feature {
                Feature::Properties(map) => {
                    if let Some(name) = map.key_of(node).map(str::to_string) {
                        map.remove(&name);
                        removal = Some((*kind, Change::Remove { key: name }));
                        break;
                    }
                }
                Feature::Children(list) | Feature::VirtualChildren(list) => {
                    if let Some(index) = list.position(node) {
                        list.remove(index)?;
                        removal = Some((*kind, Change::ListRemove { index }));
                        break;
                    }
                }
                _ => {}
            }
        }
        match removal {
            Some((kind, change)) => {
                self.record(parent, kind, change);
                Ok(())
            }
            None => Err(CoreError::invalid_operation(format!(
                "{node} is not in any slot of {parent}"
            ))),
        }
    }

    /// Assigns ids to the subtree of `top` pre-order, then queues each
    /// node's from-empty snapshot.
    fn register_subtree(&mut self, top: NodeKey) {
        let keys = self.pre_order(top);
        for key in &keys {
            let id = NodeId(self.next_id as u32);
            if let Some(node) = self.nodes.get_mut(&key.slot) {
                if node.id.is_some() {
                    continue;
                }
                node.id = Some(id);
                node.removed = false;
                node.seen = false;
                self.next_id += 1;
                self.by_id.insert(id, *key);
            }
        }
        for key in &keys {
            let records = match self.nodes.get(&key.slot) {
                Some(node) => {
                    let Some(id) = node.id else { continue };
                    let resolve = |child: NodeKey| self.nodes.get(&child.slot).and_then(|c| c.id);
                    let mut records = Vec::new();
                    for (kind, feature) in &node.features {
                        let mut changes = Vec::new();
                        feature.collect_from_empty(&resolve, &mut changes);
                        records.extend(
                            changes
                                .into_iter()
                                .map(|change| ChangeRecord::new(id, kind.id(), change)),
                        );
                    }
                    records
                }
                None => continue,
            };
            if let Some(node) = self.nodes.get_mut(&key.slot) {
                node.queue = records;
                node.dirty = true;
            }
            self.tracker.mark_dirty(*key);
        }
    }

    /// Takes ids away from the subtree of `top`, children before parents.
    fn unregister_subtree(&mut self, top: NodeKey) {
        let keys = self.pre_order(top);
        for key in keys.iter().rev() {
            self.pending_attach.remove(key);
            let Some(node) = self.nodes.get_mut(&key.slot) else {
                continue;
            };
            let Some(id) = node.id.take() else { continue };
            self.by_id.remove(&id);
            if node.seen {
                self.tracker.note_detached(id);
            }
            node.queue.clear();
            node.seen = false;
            node.removed = true;
            node.dirty = true;
            self.tracker.mark_dirty(*key);
        }
    }
}
