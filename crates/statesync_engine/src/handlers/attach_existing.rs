use crate::dispatcher::{RejectReason, RpcHandler, RpcOutcome};
use crate::error::EngineResult;
use statesync_core::{AttachResolution, NodeKey, StateTree};
use statesync_protocol::rpc::tags;
use statesync_protocol::{AttachExistingPayload, RpcEnvelope};
use tracing::warn;

/// Completes attach-existing-element requests.
///
/// The message targets the parent the request was made on.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachExistingHandler;

impl RpcHandler for AttachExistingHandler {
    fn rpc_type(&self) -> &'static str {
        tags::ATTACH_EXISTING
    }

    fn apply(
        &self,
        tree: &mut StateTree,
        node: NodeKey,
        envelope: &RpcEnvelope,
    ) -> EngineResult<RpcOutcome> {
        let payload = AttachExistingPayload::from_envelope(envelope)?;
        let requested = payload.requested;
        let outcome = match tree.complete_attach_existing(node, &payload.into_response())? {
            AttachResolution::Completed => RpcOutcome::Applied,
            AttachResolution::UnknownRequest => {
                RpcOutcome::Rejected(RejectReason::UnknownAttachRequest)
            }
            AttachResolution::TagMismatch => {
                warn!(%requested, "attach answer reports another tag");
                RpcOutcome::Rejected(RejectReason::Malformed)
            }
        };
        Ok(outcome)
    }
}
