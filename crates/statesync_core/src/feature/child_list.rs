use super::{FeatureKind, NodeFeature};
use crate::change::Change;
use crate::error::{CoreError, CoreResult};
use crate::types::{NodeId, NodeKey};

/// Ordered sequence of owned child nodes.
///
/// The list itself does not know whether it renders in place; the owning
/// [`super::Feature`] variant decides that.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildList {
    children: Vec<NodeKey>,
}

impl ChildList {
    /// Children in slot order.
    pub fn as_slice(&self) -> &[NodeKey] {
        &self.children
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Slot of `child`.
    pub fn position(&self, child: NodeKey) -> Option<usize> {
        self.children.iter().position(|c| *c == child)
    }

    pub(crate) fn from_keys(children: Vec<NodeKey>) -> Self {
        Self { children }
    }

    pub(crate) fn insert_all(&mut self, index: usize, children: &[NodeKey]) -> CoreResult<()> {
        if index > self.children.len() {
            return Err(CoreError::IndexOutOfBounds {
                index,
                len: self.children.len(),
            });
        }
        self.children.splice(index..index, children.iter().copied());
        Ok(())
    }

    pub(crate) fn remove(&mut self, index: usize) -> CoreResult<NodeKey> {
        if index >= self.children.len() {
            return Err(CoreError::IndexOutOfBounds {
                index,
                len: self.children.len(),
            });
        }
        Ok(self.children.remove(index))
    }

    pub(crate) fn take_all(&mut self) -> Vec<NodeKey> {
        std::mem::take(&mut self.children)
    }
}

impl NodeFeature for ChildList {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Children
    }

    fn collect_from_empty(
        &self,
        resolve: &dyn Fn(NodeKey) -> Option<NodeId>,
        out: &mut Vec<Change>,
    ) {
        let nodes: Vec<NodeId> = self.children.iter().filter_map(|c| resolve(*c)).collect();
        if !nodes.is_empty() {
            out.push(Change::ListInsertNodes { index: 0, nodes });
        }
    }

    fn for_each_child(&self, visit: &mut dyn FnMut(NodeKey)) {
        for child in &self.children {
            visit(*child);
        }
    }
}
