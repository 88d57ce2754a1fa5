//! Property-based test generators using proptest.
//!
//! Operations refer to nodes by position in the list of nodes a
//! [`ScriptedTree`](crate::fixtures::ScriptedTree) has created so far. The
//! position wraps around, so every generated operation can be applied to any
//! tree.

use proptest::prelude::*;
use statesync_codec::Value;

/// Property names used by generated operations.
pub const PROPERTY_NAMES: [&str; 4] = ["a", "b", "c", "value"];

/// Element tags used by generated operations.
pub const TAGS: [&str; 3] = ["div", "span", "li"];

/// Client handler names used by generated operations.
pub const HANDLER_NAMES: [&str; 3] = ["open", "close", "select"];

/// A mutation of a state tree, or a flush.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeOperation {
    /// Set a property to a value.
    SetProperty {
        /// Node position.
        node: usize,
        /// Index into [`PROPERTY_NAMES`].
        name: usize,
        /// New value.
        value: Value,
    },
    /// Set a property to a new element.
    SetNodeProperty {
        /// Node position.
        node: usize,
        /// Index into [`PROPERTY_NAMES`].
        name: usize,
        /// Index into [`TAGS`].
        tag: usize,
    },
    /// Remove a property.
    RemoveProperty {
        /// Node position.
        node: usize,
        /// Index into [`PROPERTY_NAMES`].
        name: usize,
    },
    /// Insert a new element into a child list.
    InsertChild {
        /// Parent position.
        parent: usize,
        /// Slot, wrapped to the list length.
        index: usize,
        /// Index into [`TAGS`].
        tag: usize,
    },
    /// Remove a child by slot.
    RemoveChild {
        /// Parent position.
        parent: usize,
        /// Slot, wrapped to the list length.
        index: usize,
    },
    /// Detach a node and append it to another parent.
    MoveChild {
        /// Node position.
        node: usize,
        /// New parent position.
        parent: usize,
    },
    /// Remove all children.
    ClearChildren {
        /// Parent position.
        parent: usize,
    },
    /// Replace the client handler list.
    SetHandlers {
        /// Node position.
        node: usize,
        /// Number of names taken from [`HANDLER_NAMES`].
        count: usize,
    },
    /// End the cycle.
    Flush,
}

/// Strategy for generating plain values. Floats are always finite.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Integer),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
        "[a-z]{0,8}".prop_map(Value::Text),
    ]
}

/// Strategy for generating one operation.
pub fn operation_strategy() -> impl Strategy<Value = TreeOperation> {
    let name = 0..PROPERTY_NAMES.len();
    let tag = 0..TAGS.len();
    prop_oneof![
        4 => (any::<usize>(), name.clone(), value_strategy())
            .prop_map(|(node, name, value)| TreeOperation::SetProperty { node, name, value }),
        1 => (any::<usize>(), name.clone(), tag.clone())
            .prop_map(|(node, name, tag)| TreeOperation::SetNodeProperty { node, name, tag }),
        1 => (any::<usize>(), name)
            .prop_map(|(node, name)| TreeOperation::RemoveProperty { node, name }),
        4 => (any::<usize>(), any::<usize>(), tag)
            .prop_map(|(parent, index, tag)| TreeOperation::InsertChild { parent, index, tag }),
        2 => (any::<usize>(), any::<usize>())
            .prop_map(|(parent, index)| TreeOperation::RemoveChild { parent, index }),
        1 => (any::<usize>(), any::<usize>())
            .prop_map(|(node, parent)| TreeOperation::MoveChild { node, parent }),
        1 => any::<usize>().prop_map(|parent| TreeOperation::ClearChildren { parent }),
        1 => (any::<usize>(), 0..=HANDLER_NAMES.len())
            .prop_map(|(node, count)| TreeOperation::SetHandlers { node, count }),
        1 => Just(TreeOperation::Flush),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TreeOperation>> {
    prop::collection::vec(operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
