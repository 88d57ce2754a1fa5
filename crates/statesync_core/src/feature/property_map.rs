use super::{FeatureKind, NodeFeature};
use crate::change::Change;
use crate::types::{NodeId, NodeKey};
use indexmap::IndexMap;
use statesync_codec::Value;

/// A property value: a scalar or an owned nested node.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Plain value.
    Value(Value),
    /// Owned child node.
    Node(NodeKey),
}

impl PropertyValue {
    /// The scalar, if this is not a node.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PropertyValue::Value(v) => Some(v),
            PropertyValue::Node(_) => None,
        }
    }

    /// The node, if this is one.
    pub fn as_node(&self) -> Option<NodeKey> {
        match self {
            PropertyValue::Node(key) => Some(*key),
            PropertyValue::Value(_) => None,
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::Value(value)
    }
}

/// Ordered name to value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    entries: IndexMap<String, PropertyValue>,
}

impl PropertyMap {
    /// Gets an entry.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name)
    }

    /// Whether an entry exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sets an entry, returning the previous value.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: PropertyValue,
    ) -> Option<PropertyValue> {
        self.entries.insert(name.into(), value)
    }

    /// Removes an entry.
    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.entries.shift_remove(name)
    }

    /// Name of the entry holding `child`.
    pub fn key_of(&self, child: NodeKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| v.as_node() == Some(child))
            .map(|(k, _)| k.as_str())
    }
}

impl NodeFeature for PropertyMap {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Properties
    }

    fn collect_from_empty(
        &self,
        resolve: &dyn Fn(NodeKey) -> Option<NodeId>,
        out: &mut Vec<Change>,
    ) {
        for (name, value) in &self.entries {
            match value {
                PropertyValue::Value(value) => out.push(Change::Put {
                    key: name.clone(),
                    value: value.clone(),
                }),
                PropertyValue::Node(child) => {
                    if let Some(node) = resolve(*child) {
                        out.push(Change::PutNode {
                            key: name.clone(),
                            node,
                        });
                    }
                }
            }
        }
    }

    fn for_each_child(&self, visit: &mut dyn FnMut(NodeKey)) {
        for value in self.entries.values() {
            if let PropertyValue::Node(child) = value {
                visit(*child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TreeId;

    #[test]
    fn from_empty_skips_unresolved_nodes() {
        let child = NodeKey {
            tree: TreeId(1),
            slot: 9,
        };
        let mut map = PropertyMap::default();
        map.insert("a", Value::Integer(1).into());
        map.insert("b", PropertyValue::Node(child));

        let mut out = Vec::new();
        map.collect_from_empty(&|_| None, &mut out);
        assert_eq!(out.len(), 1);

        out.clear();
        map.collect_from_empty(&|_| Some(NodeId(5)), &mut out);
        assert_eq!(
            out[1],
            Change::PutNode {
                key: "b".into(),
                node: NodeId(5)
            }
        );
        assert_eq!(map.key_of(child), Some("b"));
    }

    #[test]
    fn remove_keeps_order_of_rest() {
        let mut map = PropertyMap::default();
        for name in ["x", "y", "z"] {
            map.insert(name, Value::Null.into());
        }
        map.remove("y");
        let names: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["x", "z"]);
    }
}
