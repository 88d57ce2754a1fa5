//! The fixed feature descriptor table.

use std::fmt;

/// Small integer identifying a feature type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(pub u8);

impl FeatureId {
    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Looks up the descriptor for this id.
    pub fn descriptor(self) -> Option<&'static FeatureDescriptor> {
        descriptor(self)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feat:{}", self.0)
    }
}

/// Every feature type known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKind {
    /// Map carried by the document pseudo node (the `root` slot).
    Document,
    /// Fixed element fields such as the tag.
    ElementData,
    /// Element properties.
    Properties,
    /// Rendered child elements.
    Children,
    /// Children that are tracked but not rendered in place.
    VirtualChildren,
    /// Event listeners and their data expressions.
    Listeners,
    /// Method names the client may invoke.
    ClientHandlers,
}

impl FeatureKind {
    /// All kinds in id order.
    pub const ALL: [FeatureKind; 7] = [
        FeatureKind::Document,
        FeatureKind::ElementData,
        FeatureKind::Properties,
        FeatureKind::Children,
        FeatureKind::VirtualChildren,
        FeatureKind::Listeners,
        FeatureKind::ClientHandlers,
    ];

    /// Kinds declared by element nodes.
    pub const ELEMENT: [FeatureKind; 6] = [
        FeatureKind::ElementData,
        FeatureKind::Properties,
        FeatureKind::Children,
        FeatureKind::VirtualChildren,
        FeatureKind::Listeners,
        FeatureKind::ClientHandlers,
    ];

    /// The descriptor of this kind.
    pub fn descriptor(self) -> &'static FeatureDescriptor {
        &REGISTRY[self as usize]
    }

    /// Wire id of this kind.
    pub fn id(self) -> FeatureId {
        self.descriptor().id
    }

    /// Wire key of this kind.
    pub fn wire_key(self) -> &'static str {
        self.descriptor().wire_key
    }

    /// Shape of this kind.
    pub fn shape(self) -> FeatureShape {
        self.descriptor().shape
    }

    pub(crate) fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Whether a feature is keyed or positional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureShape {
    /// String-keyed entries.
    Map,
    /// Index-addressed entries.
    List,
}

/// Immutable description of a feature type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDescriptor {
    /// Wire id.
    pub id: FeatureId,
    /// Feature kind.
    pub kind: FeatureKind,
    /// Key used in wire entries for list records and in rendered output.
    pub wire_key: &'static str,
    /// Map or list.
    pub shape: FeatureShape,
}

/// The descriptor table. Ids equal positions.
pub static REGISTRY: [FeatureDescriptor; 7] = [
    FeatureDescriptor {
        id: FeatureId(0),
        kind: FeatureKind::Document,
        wire_key: "document",
        shape: FeatureShape::Map,
    },
    FeatureDescriptor {
        id: FeatureId(1),
        kind: FeatureKind::ElementData,
        wire_key: "elementData",
        shape: FeatureShape::Map,
    },
    FeatureDescriptor {
        id: FeatureId(2),
        kind: FeatureKind::Properties,
        wire_key: "properties",
        shape: FeatureShape::Map,
    },
    FeatureDescriptor {
        id: FeatureId(3),
        kind: FeatureKind::Children,
        wire_key: "children",
        shape: FeatureShape::List,
    },
    FeatureDescriptor {
        id: FeatureId(4),
        kind: FeatureKind::VirtualChildren,
        wire_key: "virtualChildren",
        shape: FeatureShape::List,
    },
    FeatureDescriptor {
        id: FeatureId(5),
        kind: FeatureKind::Listeners,
        wire_key: "listeners",
        shape: FeatureShape::Map,
    },
    FeatureDescriptor {
        id: FeatureId(6),
        kind: FeatureKind::ClientHandlers,
        wire_key: "clientHandlers",
        shape: FeatureShape::List,
    },
];

/// Looks up a descriptor by wire id.
pub fn descriptor(id: FeatureId) -> Option<&'static FeatureDescriptor> {
    REGISTRY.get(id.0 as usize)
}

/// Looks up a descriptor by wire key.
pub fn descriptor_by_key(wire_key: &str) -> Option<&'static FeatureDescriptor> {
    REGISTRY.iter().find(|d| d.wire_key == wire_key)
}
