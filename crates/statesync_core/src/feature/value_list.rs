use super::{FeatureKind, NodeFeature};
use crate::change::Change;
use crate::types::{NodeId, NodeKey};
use statesync_codec::Value;

/// Ordered list of scalar values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueList {
    values: Vec<Value>,
}

impl ValueList {
    /// Values in order.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn replace_all(&mut self, values: Vec<Value>) {
        self.values = values;
    }
}

impl NodeFeature for ValueList {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ClientHandlers
    }

    fn collect_from_empty(
        &self,
        _resolve: &dyn Fn(NodeKey) -> Option<NodeId>,
        out: &mut Vec<Change>,
    ) {
        if !self.values.is_empty() {
            out.push(Change::ListInsertMany {
                index: 0,
                values: self.values.clone(),
            });
        }
    }

    fn for_each_child(&self, _visit: &mut dyn FnMut(NodeKey)) {}
}
