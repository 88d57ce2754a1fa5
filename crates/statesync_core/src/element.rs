//! Feature-level mutation API.
//!
//! These methods are what application code and RPC handlers call. Each one
//! updates the feature and queues the matching change record.

use crate::change::Change;
use crate::error::{CoreError, CoreResult};
use crate::feature::{ChildList, Feature, FeatureKind, PropertyMap, PropertyValue};
use crate::tree::StateTree;
use crate::types::{NodeId, NodeKey};
use statesync_codec::Value;

impl StateTree {
    /// The element tag of a node, if it has one.
    pub fn tag(&self, node: NodeKey) -> Option<&str> {
        match self.node(node)?.feature(FeatureKind::ElementData)? {
            Feature::ElementData(data) => data.tag(),
            _ => None,
        }
    }

    // Properties

    /// Reads a property.
    pub fn property(&self, node: NodeKey, name: &str) -> CoreResult<Option<&PropertyValue>> {
        Ok(self.properties(node)?.and_then(|map| map.get(name)))
    }

    /// Property names in insertion order.
    pub fn property_names(&self, node: NodeKey) -> CoreResult<Vec<String>> {
        Ok(self
            .properties(node)?
            .map(|map| map.iter().map(|(k, _)| k.to_string()).collect())
            .unwrap_or_default())
    }

    /// Sets a property to a scalar. A node previously held under that name is
    /// detached.
    pub fn set_property(
        &mut self,
        node: NodeKey,
        name: &str,
        value: impl Into<Value>,
    ) -> CoreResult<()> {
        let value = value.into();
        let old = self
            .properties_mut(node)?
            .insert(name, PropertyValue::Value(value.clone()));
        self.record(
            node,
            FeatureKind::Properties,
            Change::Put {
                key: name.to_string(),
                value,
            },
        );
        if let Some(PropertyValue::Node(old)) = old {
            self.orphan(old);
        }
        Ok(())
    }

    /// Sets a property to an owned child node. Returns the child's id when
    /// `node` is registered.
    pub fn set_property_node(
        &mut self,
        node: NodeKey,
        name: &str,
        child: NodeKey,
    ) -> CoreResult<Option<NodeId>> {
        self.check_attachable(child, node)?;
        self.properties_mut(node)?;
        if self.is_registered(node) {
            self.ensure_id_space(&[child])?;
        }
        let old = self
            .properties_mut(node)?
            .insert(name, PropertyValue::Node(child));
        self.link(child, node);
        let id = self.node_id(child);
        if let Some(id) = id {
            self.record(
                node,
                FeatureKind::Properties,
                Change::PutNode {
                    key: name.to_string(),
                    node: id,
                },
            );
        }
        if let Some(PropertyValue::Node(old)) = old {
            self.orphan(old);
        }
        Ok(id)
    }

    /// Removes a property. A node-valued property is detached.
    pub fn remove_property(
        &mut self,
        node: NodeKey,
        name: &str,
    ) -> CoreResult<Option<PropertyValue>> {
        let old = self.properties_mut(node)?.remove(name);
        if old.is_some() {
            self.record(
                node,
                FeatureKind::Properties,
                Change::Remove {
                    key: name.to_string(),
                },
            );
        }
        if let Some(PropertyValue::Node(child)) = &old {
            self.orphan(*child);
        }
        Ok(old)
    }

    fn properties(&self, node: NodeKey) -> CoreResult<Option<&PropertyMap>> {
        match self.feature(node, FeatureKind::Properties)? {
            Some(Feature::Properties(map)) => Ok(Some(map)),
            _ => Ok(None),
        }
    }

    fn properties_mut(&mut self, node: NodeKey) -> CoreResult<&mut PropertyMap> {
        match self.feature_mut(node, FeatureKind::Properties)? {
            Feature::Properties(map) => Ok(map),
            _ => Err(CoreError::MissingFeature {
                node,
                kind: FeatureKind::Properties,
            }),
        }
    }

    // Children

    /// Rendered children in slot order.
    pub fn children(&self, parent: NodeKey) -> CoreResult<Vec<NodeKey>> {
        self.child_keys(parent, FeatureKind::Children)
    }

    /// Virtual children in slot order.
    pub fn virtual_children(&self, parent: NodeKey) -> CoreResult<Vec<NodeKey>> {
        self.child_keys(parent, FeatureKind::VirtualChildren)
    }

    /// Inserts a child at `index`.
    pub fn insert_child(
        &mut self,
        parent: NodeKey,
        index: usize,
        child: NodeKey,
    ) -> CoreResult<()> {
        self.insert_nodes(parent, FeatureKind::Children, index, &[child])
    }

    /// Inserts consecutive children starting at `index`, recorded as one
    /// batch.
    pub fn insert_children(
        &mut self,
        parent: NodeKey,
        index: usize,
        children: &[NodeKey],
    ) -> CoreResult<()> {
        self.insert_nodes(parent, FeatureKind::Children, index, children)
    }

    /// Appends a child.
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> CoreResult<()> {
        let len = self.list_len(parent, FeatureKind::Children)?;
        self.insert_nodes(parent, FeatureKind::Children, len, &[child])
    }

    /// Removes and detaches the child at `index`.
    pub fn remove_child(&mut self, parent: NodeKey, index: usize) -> CoreResult<NodeKey> {
        self.remove_node_at(parent, FeatureKind::Children, index)
    }

    /// Removes and detaches every child, recorded as one clear.
    pub fn remove_all_children(&mut self, parent: NodeKey) -> CoreResult<Vec<NodeKey>> {
        let removed = self.child_list_mut(parent, FeatureKind::Children)?.take_all();
        self.record(parent, FeatureKind::Children, Change::ListClear);
        for child in &removed {
            self.orphan(*child);
        }
        Ok(removed)
    }

    /// Appends a virtual child.
    pub fn append_virtual_child(&mut self, parent: NodeKey, child: NodeKey) -> CoreResult<()> {
        let len = self.list_len(parent, FeatureKind::VirtualChildren)?;
        self.insert_nodes(parent, FeatureKind::VirtualChildren, len, &[child])
    }

    /// Removes and detaches a virtual child.
    pub fn remove_virtual_child(&mut self, parent: NodeKey, child: NodeKey) -> CoreResult<()> {
        let index = self
            .child_list_mut(parent, FeatureKind::VirtualChildren)?
            .position(child)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("{child} is not a virtual child of {parent}"))
            })?;
        self.remove_node_at(parent, FeatureKind::VirtualChildren, index)?;
        Ok(())
    }

    fn child_keys(&self, parent: NodeKey, kind: FeatureKind) -> CoreResult<Vec<NodeKey>> {
        Ok(self
            .feature(parent, kind)?
            .and_then(Feature::as_child_list)
            .map(|list| list.as_slice().to_vec())
            .unwrap_or_default())
    }

    fn list_len(&mut self, parent: NodeKey, kind: FeatureKind) -> CoreResult<usize> {
        Ok(self.child_list_mut(parent, kind)?.len())
    }

    fn child_list_mut(&mut self, parent: NodeKey, kind: FeatureKind) -> CoreResult<&mut ChildList> {
        self.feature_mut(parent, kind)?
            .as_child_list_mut()
            .ok_or(CoreError::MissingFeature { node: parent, kind })
    }

    fn insert_nodes(
        &mut self,
        parent: NodeKey,
        kind: FeatureKind,
        index: usize,
        children: &[NodeKey],
    ) -> CoreResult<()> {
        if children.is_empty() {
            return Ok(());
        }
        for (i, child) in children.iter().enumerate() {
            if children[..i].contains(child) {
                return Err(CoreError::AlreadyHasParent { node: *child });
            }
            self.check_attachable(*child, parent)?;
        }
        let len = self.list_len(parent, kind)?;
        if index > len {
            return Err(CoreError::IndexOutOfBounds { index, len });
        }
        if self.is_registered(parent) {
            self.ensure_id_space(children)?;
        }
        self.child_list_mut(parent, kind)?.insert_all(index, children)?;
        for child in children {
            self.link(*child, parent);
        }
        let ids: Vec<NodeId> = children.iter().filter_map(|c| self.node_id(*c)).collect();
        let change = match ids.as_slice() {
            [] => return Ok(()),
            [node] => Change::ListInsertNode { index, node: *node },
            _ => Change::ListInsertNodes { index, nodes: ids },
        };
        self.record(parent, kind, change);
        Ok(())
    }

    fn remove_node_at(
        &mut self,
        parent: NodeKey,
        kind: FeatureKind,
        index: usize,
    ) -> CoreResult<NodeKey> {
        let child = self.child_list_mut(parent, kind)?.remove(index)?;
        self.record(parent, kind, Change::ListRemove { index });
        self.orphan(child);
        Ok(child)
    }

    // Client handlers

    /// Method names published to the client.
    pub fn client_handlers(&self, node: NodeKey) -> CoreResult<Vec<String>> {
        Ok(match self.feature(node, FeatureKind::ClientHandlers)? {
            Some(Feature::ClientHandlers(list)) => list
                .as_slice()
                .iter()
                .filter_map(|v| v.as_text().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Replaces the published method names: one clear, then one batch insert.
    pub fn set_client_handlers(&mut self, node: NodeKey, names: &[String]) -> CoreResult<()> {
        let values: Vec<Value> = names.iter().map(|n| Value::from(n.as_str())).collect();
        match self.feature_mut(node, FeatureKind::ClientHandlers)? {
            Feature::ClientHandlers(list) => list.replace_all(values.clone()),
            _ => {
                return Err(CoreError::MissingFeature {
                    node,
                    kind: FeatureKind::ClientHandlers,
                })
            }
        }
        self.record(node, FeatureKind::ClientHandlers, Change::ListClear);
        if !values.is_empty() {
            self.record(
                node,
                FeatureKind::ClientHandlers,
                Change::ListInsertMany { index: 0, values },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_root() -> (StateTree, NodeKey) {
        let mut tree = StateTree::new();
        let root = tree.create_element("body");
        tree.attach_root(root).unwrap();
        (tree, root)
    }

    fn queued_changes(tree: &StateTree, node: NodeKey) -> Vec<Change> {
        tree.node(node)
            .unwrap()
            .queued()
            .iter()
            .map(|r| r.change.clone())
            .collect()
    }

    #[test]
    fn from_empty_snapshot_on_attach() {
        let (mut tree, root) = tree_with_root();
        let div = tree.create_element("div");
        tree.set_property(div, "value", Value::Float(0.0)).unwrap();
        let id = tree.attach(div, root).unwrap().unwrap();

        assert_eq!(
            queued_changes(&tree, div),
            vec![
                Change::Put {
                    key: "tag".into(),
                    value: Value::from("div")
                },
                Change::Put {
                    key: "value".into(),
                    value: Value::Float(0.0)
                },
            ]
        );
        assert_eq!(
            queued_changes(&tree, root).last(),
            Some(&Change::ListInsertNode { index: 0, node: id })
        );
    }

    #[test]
    fn batch_insert_records_one_entry() {
        let (mut tree, root) = tree_with_root();
        let a = tree.create_element("li");
        let b = tree.create_element("li");
        tree.insert_children(root, 0, &[a, b]).unwrap();

        let ids = vec![tree.node_id(a).unwrap(), tree.node_id(b).unwrap()];
        assert_eq!(
            queued_changes(&tree, root).last(),
            Some(&Change::ListInsertNodes { index: 0, nodes: ids })
        );
        assert_eq!(tree.children(root).unwrap(), vec![a, b]);
    }

    #[test]
    fn insert_rejects_bad_index_and_duplicates() {
        let (mut tree, root) = tree_with_root();
        let a = tree.create_element("li");
        assert!(matches!(
            tree.insert_child(root, 3, a),
            Err(CoreError::IndexOutOfBounds { index: 3, len: 0 })
        ));
        assert!(tree.insert_children(root, 0, &[a, a]).is_err());
        assert!(tree.parent(a).is_none());
    }

    #[test]
    fn remove_child_records_list_remove_and_detaches() {
        let (mut tree, root) = tree_with_root();
        let a = tree.create_element("li");
        tree.append_child(root, a).unwrap();
        let removed = tree.remove_child(root, 0).unwrap();

        assert_eq!(removed, a);
        assert!(!tree.is_registered(a));
        assert_eq!(
            queued_changes(&tree, root).last(),
            Some(&Change::ListRemove { index: 0 })
        );
    }

    #[test]
    fn replacing_node_property_detaches_old_node() {
        let (mut tree, root) = tree_with_root();
        let model = tree.create_node(&[FeatureKind::Properties]).unwrap();
        tree.set_property_node(root, "model", model).unwrap();
        assert!(tree.is_registered(model));

        tree.set_property(root, "model", Value::Null).unwrap();
        assert!(!tree.is_registered(model));
        assert_eq!(tree.parent(model), None);
    }

    #[test]
    fn remove_property_records_remove_only_when_present() {
        let (mut tree, root) = tree_with_root();
        let before = queued_changes(&tree, root).len();
        assert_eq!(tree.remove_property(root, "missing").unwrap(), None);
        assert_eq!(queued_changes(&tree, root).len(), before);

        tree.set_property(root, "x", 1i64).unwrap();
        tree.remove_property(root, "x").unwrap();
        assert_eq!(
            queued_changes(&tree, root).last(),
            Some(&Change::Remove { key: "x".into() })
        );
    }

    #[test]
    fn client_handlers_are_clear_then_batch() {
        let (mut tree, root) = tree_with_root();
        tree.set_client_handlers(root, &["save".to_string(), "load".to_string()])
            .unwrap();
        let changes = queued_changes(&tree, root);
        assert_eq!(changes[changes.len() - 2], Change::ListClear);
        assert_eq!(
            changes[changes.len() - 1],
            Change::ListInsertMany {
                index: 0,
                values: vec![Value::from("save"), Value::from("load")]
            }
        );
        assert_eq!(tree.client_handlers(root).unwrap(), vec!["save", "load"]);
    }

    #[test]
    fn tag_of_element() {
        let mut tree = StateTree::new();
        let node = tree.create_element("vaadin-button");
        assert_eq!(tree.tag(node), Some("vaadin-button"));
        let plain = tree.create_node(&[FeatureKind::Properties]).unwrap();
        assert_eq!(tree.tag(plain), None);
    }
}
