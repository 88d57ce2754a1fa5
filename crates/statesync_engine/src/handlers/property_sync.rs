use crate::dispatcher::{RejectReason, RpcHandler, RpcOutcome};
use crate::error::EngineResult;
use statesync_core::{Lookup, NodeKey, StateTree};
use statesync_protocol::rpc::tags;
use statesync_protocol::{InboundValue, PropertySyncPayload, RpcEnvelope};

/// Stores property values reported by the client.
///
/// A value referring to another node stores a deep copy of that node, so the
/// property never aliases a node that lives elsewhere in the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertySyncHandler;

impl RpcHandler for PropertySyncHandler {
    fn rpc_type(&self) -> &'static str {
        tags::PROPERTY_SYNC
    }

    fn apply(
        &self,
        tree: &mut StateTree,
        node: NodeKey,
        envelope: &RpcEnvelope,
    ) -> EngineResult<RpcOutcome> {
        let payload = PropertySyncPayload::from_envelope(envelope)?;
        match payload.value {
            InboundValue::Value(value) => tree.set_property(node, &payload.property, value)?,
            InboundValue::Node(id) => {
                let Lookup::Found(source) = tree.get_by_id(id) else {
                    return Ok(RpcOutcome::Rejected(RejectReason::StaleNode));
                };
                let copy = tree.deep_copy(source)?;
                if let Err(err) = tree.set_property_node(node, &payload.property, copy) {
                    tree.release(copy)?;
                    return Err(err.into());
                }
            }
        }
        Ok(RpcOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statesync_core::{PropertyValue, Value};
    use statesync_protocol::rpc;

    fn setup() -> (StateTree, NodeKey, NodeKey) {
        let mut tree = StateTree::new();
        let root = tree.create_element("body");
        let source = tree.create_element("div");
        tree.set_property(source, "bar", "baz").unwrap();
        tree.append_child(root, source).unwrap();
        tree.attach_root(root).unwrap();
        (tree, root, source)
    }

    #[test]
    fn stores_plain_values() {
        let (mut tree, root, _) = setup();
        let id = tree.node_id(root).unwrap();
        let envelope = rpc::property_sync(id, "value", json!("typed"));

        assert_eq!(
            PropertySyncHandler.apply(&mut tree, root, &envelope).unwrap(),
            RpcOutcome::Applied
        );
        assert_eq!(
            tree.property(root, "value").unwrap(),
            Some(&PropertyValue::Value(Value::from("typed")))
        );
    }

    #[test]
    fn node_reference_stores_independent_copy() {
        let (mut tree, root, source) = setup();
        let root_id = tree.node_id(root).unwrap();
        let source_id = tree.node_id(source).unwrap();
        let envelope = rpc::property_sync(root_id, "model", rpc::node_ref(source_id));

        PropertySyncHandler.apply(&mut tree, root, &envelope).unwrap();

        let copy = tree
            .property(root, "model")
            .unwrap()
            .and_then(PropertyValue::as_node)
            .unwrap();
        assert_ne!(copy, source);
        assert_eq!(
            tree.property(copy, "bar").unwrap(),
            Some(&PropertyValue::Value(Value::from("baz")))
        );

        tree.set_property(copy, "bar", "changed").unwrap();
        assert_eq!(
            tree.property(source, "bar").unwrap(),
            Some(&PropertyValue::Value(Value::from("baz")))
        );
    }

    #[test]
    fn stale_reference_is_rejected() {
        let (mut tree, root, _) = setup();
        let id = tree.node_id(root).unwrap();
        let envelope = rpc::property_sync(id, "model", rpc::node_ref(statesync_core::NodeId(77)));
        assert_eq!(
            PropertySyncHandler.apply(&mut tree, root, &envelope).unwrap(),
            RpcOutcome::Rejected(RejectReason::StaleNode)
        );
    }
}
