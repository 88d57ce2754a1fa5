//! Node features.
//!
//! A node holds a sparse set of features. Each feature is one variant of the
//! closed [`Feature`] enum, identified through the static [`REGISTRY`]. All
//! variants expose the same [`NodeFeature`] capability: describing their
//! state as change records from an empty start, and enumerating the child
//! nodes they own.

mod child_list;
mod element_data;
mod listener_map;
mod property_map;
mod registry;
mod value_list;

pub use child_list::ChildList;
pub use element_data::ElementData;
pub use listener_map::ListenerMap;
pub use property_map::{PropertyMap, PropertyValue};
pub use registry::{
    descriptor, descriptor_by_key, FeatureDescriptor, FeatureId, FeatureKind, FeatureShape,
    REGISTRY,
};
pub use value_list::ValueList;

use crate::change::Change;
use crate::types::{NodeId, NodeKey};

/// Behavior shared by every feature variant.
pub trait NodeFeature {
    /// The feature's kind.
    fn kind(&self) -> FeatureKind;

    /// Appends the changes that rebuild this feature on a client that has
    /// never seen it. `resolve` maps owned children to their ids.
    fn collect_from_empty(
        &self,
        resolve: &dyn Fn(NodeKey) -> Option<NodeId>,
        out: &mut Vec<Change>,
    );

    /// Visits owned child nodes in slot order.
    fn for_each_child(&self, visit: &mut dyn FnMut(NodeKey));
}

/// A feature instance.
#[derive(Debug, Clone)]
pub enum Feature {
    /// Element fields.
    ElementData(ElementData),
    /// Element properties.
    Properties(PropertyMap),
    /// Rendered children.
    Children(ChildList),
    /// Virtual children.
    VirtualChildren(ChildList),
    /// Event listeners.
    Listeners(ListenerMap),
    /// Published client handler names.
    ClientHandlers(ValueList),
}

impl Feature {
    /// Creates an empty instance. The document feature has no node-side
    /// instance and yields `None`.
    pub fn empty(kind: FeatureKind) -> Option<Self> {
        Some(match kind {
            FeatureKind::Document => return None,
            FeatureKind::ElementData => Feature::ElementData(ElementData::default()),
            FeatureKind::Properties => Feature::Properties(PropertyMap::default()),
            FeatureKind::Children => Feature::Children(ChildList::default()),
            FeatureKind::VirtualChildren => Feature::VirtualChildren(ChildList::default()),
            FeatureKind::Listeners => Feature::Listeners(ListenerMap::default()),
            FeatureKind::ClientHandlers => Feature::ClientHandlers(ValueList::default()),
        })
    }

    fn as_dyn(&self) -> &dyn NodeFeature {
        match self {
            Feature::ElementData(f) => f,
            Feature::Properties(f) => f,
            Feature::Children(f) | Feature::VirtualChildren(f) => f,
            Feature::Listeners(f) => f,
            Feature::ClientHandlers(f) => f,
        }
    }

    /// The child list, for the two child list kinds.
    pub fn as_child_list(&self) -> Option<&ChildList> {
        match self {
            Feature::Children(list) | Feature::VirtualChildren(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn as_child_list_mut(&mut self) -> Option<&mut ChildList> {
        match self {
            Feature::Children(list) | Feature::VirtualChildren(list) => Some(list),
            _ => None,
        }
    }
}

impl NodeFeature for Feature {
    fn kind(&self) -> FeatureKind {
        match self {
            Feature::ElementData(_) => FeatureKind::ElementData,
            Feature::Properties(_) => FeatureKind::Properties,
            Feature::Children(_) => FeatureKind::Children,
            Feature::VirtualChildren(_) => FeatureKind::VirtualChildren,
            Feature::Listeners(_) => FeatureKind::Listeners,
            Feature::ClientHandlers(_) => FeatureKind::ClientHandlers,
        }
    }

    fn collect_from_empty(
        &self,
        resolve: &dyn Fn(NodeKey) -> Option<NodeId>,
        out: &mut Vec<Change>,
    ) {
        self.as_dyn().collect_from_empty(resolve, out);
    }

    fn for_each_child(&self, visit: &mut dyn FnMut(NodeKey)) {
        self.as_dyn().for_each_child(visit);
    }
}

/// Set of feature kinds declared by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet(u8);

impl FeatureSet {
    /// The kinds carried by element nodes.
    pub fn element() -> Self {
        Self::from_kinds(&FeatureKind::ELEMENT)
    }

    /// Builds a set from kinds.
    pub fn from_kinds(kinds: &[FeatureKind]) -> Self {
        Self(kinds.iter().fold(0, |bits, kind| bits | kind.bit()))
    }

    /// Whether the set holds `kind`.
    pub fn contains(self, kind: FeatureKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Declared kinds in id order.
    pub fn iter(self) -> impl Iterator<Item = FeatureKind> {
        FeatureKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}
