use crate::dispatcher::{RejectReason, RpcHandler, RpcOutcome};
use crate::error::EngineResult;
use statesync_core::{CoreError, FireOutcome, NodeKey, StateTree};
use statesync_protocol::rpc::tags;
use statesync_protocol::{EventPayload, RpcEnvelope};

/// Fires client events into the target's listeners.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventHandler;

impl RpcHandler for EventHandler {
    fn rpc_type(&self) -> &'static str {
        tags::EVENT
    }

    fn apply(
        &self,
        tree: &mut StateTree,
        node: NodeKey,
        envelope: &RpcEnvelope,
    ) -> EngineResult<RpcOutcome> {
        let payload = EventPayload::from_envelope(envelope)?;
        match tree.fire_event(node, &payload.event_type, payload.data) {
            Ok(FireOutcome::Delivered(_)) => Ok(RpcOutcome::Applied),
            Ok(FireOutcome::NoListener) | Err(CoreError::MissingFeature { .. }) => {
                Ok(RpcOutcome::Rejected(RejectReason::NoListener))
            }
            Err(err) => Err(err.into()),
        }
    }
}
