use crate::dispatcher::{RejectReason, RpcHandler, RpcOutcome};
use crate::error::EngineResult;
use crate::methods::{MethodArg, MethodRegistry};
use statesync_core::{Lookup, NodeKey, StateTree};
use statesync_protocol::rpc::tags;
use statesync_protocol::{InboundValue, MethodInvokePayload, RpcEnvelope};
use std::sync::Arc;

/// Calls template methods published by the target's tag.
#[derive(Debug, Clone)]
pub struct MethodInvokeHandler {
    methods: Arc<MethodRegistry>,
}

impl MethodInvokeHandler {
    /// Creates a handler resolving calls in `methods`.
    pub fn new(methods: Arc<MethodRegistry>) -> Self {
        Self { methods }
    }
}

impl RpcHandler for MethodInvokeHandler {
    fn rpc_type(&self) -> &'static str {
        tags::TEMPLATE_METHOD
    }

    fn apply(
        &self,
        tree: &mut StateTree,
        node: NodeKey,
        envelope: &RpcEnvelope,
    ) -> EngineResult<RpcOutcome> {
        let payload = MethodInvokePayload::from_envelope(envelope)?;
        let tag = tree.tag(node).unwrap_or_default().to_string();
        let method = self.methods.resolve(&tag, &payload.method, payload.args.len())?;

        let mut args = Vec::with_capacity(payload.args.len());
        for arg in payload.args {
            args.push(match arg {
                InboundValue::Value(value) => MethodArg::Value(value),
                InboundValue::Node(id) => match tree.get_by_id(id) {
                    Lookup::Found(key) => MethodArg::Node(key),
                    Lookup::NotFound => return Ok(RpcOutcome::Rejected(RejectReason::StaleNode)),
                },
            });
        }
        method(tree, node, &args)?;
        Ok(RpcOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::json;
    use statesync_core::{CoreError, CoreResult, PropertyValue, Value};
    use statesync_protocol::rpc;

    fn select(tree: &mut StateTree, node: NodeKey, args: &[MethodArg]) -> CoreResult<()> {
        if let Some(MethodArg::Value(value)) = args.first() {
            tree.set_property(node, "selected", value.clone())?;
        }
        Ok(())
    }

    fn registry() -> Arc<MethodRegistry> {
        Arc::new(
            MethodRegistry::builder()
                .method("my-list", "select", select)
                .method("my-list", "fail", |_: &mut StateTree, _: NodeKey, _: &[MethodArg]| {
                    Err(CoreError::handler("refused"))
                })
                .build(),
        )
    }

    fn setup() -> (StateTree, NodeKey) {
        let mut tree = StateTree::new();
        let list = tree.create_element("my-list");
        tree.attach_root(list).unwrap();
        (tree, list)
    }

    #[test]
    fn calls_the_registered_method() {
        let (mut tree, list) = setup();
        let id = tree.node_id(list).unwrap();
        let handler = MethodInvokeHandler::new(registry());

        let envelope = rpc::method_invoke(id, "select", vec![json!(3)]);
        assert_eq!(handler.apply(&mut tree, list, &envelope).unwrap(), RpcOutcome::Applied);
        assert_eq!(
            tree.property(list, "selected").unwrap(),
            Some(&PropertyValue::Value(Value::Integer(3)))
        );
    }

    #[test]
    fn unknown_method_is_an_error() {
        let (mut tree, list) = setup();
        let id = tree.node_id(list).unwrap();
        let handler = MethodInvokeHandler::new(registry());

        let envelope = rpc::method_invoke(id, "missing", vec![]);
        assert!(matches!(
            handler.apply(&mut tree, list, &envelope),
            Err(EngineError::AmbiguousOrMissingHandler { matches: 0, .. })
        ));
    }

    #[test]
    fn method_failure_propagates() {
        let (mut tree, list) = setup();
        let id = tree.node_id(list).unwrap();
        let handler = MethodInvokeHandler::new(registry());

        let envelope = rpc::method_invoke(id, "fail", vec![]);
        assert!(matches!(
            handler.apply(&mut tree, list, &envelope),
            Err(EngineError::Core(CoreError::HandlerFailed { .. }))
        ));
    }

    #[test]
    fn stale_node_argument() {
        let (mut tree, list) = setup();
        let id = tree.node_id(list).unwrap();
        let handler = MethodInvokeHandler::new(registry());

        let stale = rpc::node_ref(statesync_core::NodeId(50));
        let envelope = rpc::method_invoke(id, "select", vec![stale]);
        assert_eq!(
            handler.apply(&mut tree, list, &envelope).unwrap(),
            RpcOutcome::Rejected(RejectReason::StaleNode)
        );
    }
}
