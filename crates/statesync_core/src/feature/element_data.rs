use super::{FeatureKind, NodeFeature};
use crate::change::Change;
use crate::types::{NodeId, NodeKey};
use statesync_codec::Value;

/// Fixed element fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementData {
    tag: Option<String>,
}

impl ElementData {
    /// Key of the tag entry.
    pub const TAG: &'static str = "tag";

    /// Creates element data with a tag.
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
        }
    }

    /// The element tag, if set.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl NodeFeature for ElementData {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ElementData
    }

    fn collect_from_empty(
        &self,
        _resolve: &dyn Fn(NodeKey) -> Option<NodeId>,
        out: &mut Vec<Change>,
    ) {
        if let Some(tag) = &self.tag {
            out.push(Change::Put {
                key: Self::TAG.to_string(),
                value: Value::from(tag.as_str()),
            });
        }
    }

    fn for_each_child(&self, _visit: &mut dyn FnMut(NodeKey)) {}
}
