//! Per-tree change tracking.
//!
//! Every mutating feature access funnels through [`StateTree::record`]. The
//! record lands in the node's own queue and the node joins the tree's dirty
//! set. Records for nodes without an id are dropped: their state is sent as
//! a from-empty snapshot once they are attached.

use crate::change::{Change, ChangeRecord};
use crate::feature::FeatureKind;
use crate::tree::StateTree;
use crate::types::{NodeId, NodeKey};
use indexmap::IndexSet;

/// Bookkeeping for the current flush cycle.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    document: Vec<ChangeRecord>,
    dirty: IndexSet<NodeKey>,
    detached: Vec<NodeId>,
}

impl ChangeTracker {
    /// True when nothing was recorded since the last flush.
    pub fn is_clean(&self) -> bool {
        self.document.is_empty() && self.dirty.is_empty() && self.detached.is_empty()
    }

    /// Number of dirty nodes, detached ones included.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Whether `node` is in the dirty set.
    pub fn is_dirty(&self, node: NodeKey) -> bool {
        self.dirty.contains(&node)
    }

    /// Records queued on the document pseudo node.
    pub fn document_queue(&self) -> &[ChangeRecord] {
        &self.document
    }

    pub(crate) fn record_document(&mut self, change: Change) {
        self.document.push(ChangeRecord::new(
            NodeId::DOCUMENT,
            FeatureKind::Document.id(),
            change,
        ));
    }

    pub(crate) fn mark_dirty(&mut self, node: NodeKey) {
        self.dirty.insert(node);
    }

    pub(crate) fn forget(&mut self, node: NodeKey) {
        self.dirty.shift_remove(&node);
    }

    pub(crate) fn note_detached(&mut self, id: NodeId) {
        self.detached.push(id);
    }

    pub(crate) fn take_document(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.document)
    }

    pub(crate) fn take_dirty(&mut self) -> IndexSet<NodeKey> {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn take_detached(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.detached)
    }
}

impl StateTree {
    /// Queues `change` on `node`'s `kind` feature.
    ///
    /// Returns false when the node has no id; such records are dropped.
    pub(crate) fn record(&mut self, node: NodeKey, kind: FeatureKind, change: Change) -> bool {
        let Some(state) = self.nodes.get_mut(&node.slot) else {
            return false;
        };
        let Some(id) = state.id else {
            return false;
        };
        state.queue.push(ChangeRecord::new(id, kind.id(), change));
        state.dirty = true;
        self.tracker.mark_dirty(node);
        true
    }

    /// The change tracker.
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }
}
