//! Inbound RPC dispatch.
//!
//! Each message goes `Received -> Resolved -> Applied`, or stops at
//! `Rejected(reason)`. Rejections stay scoped to their message.

use crate::error::{EngineError, EngineResult};
use crate::handlers::{
    AttachExistingHandler, EventHandler, MethodInvokeHandler, PropertySyncHandler,
};
use crate::methods::MethodRegistry;
use statesync_core::{Lookup, NodeId, NodeKey, StateTree};
use statesync_protocol::RpcEnvelope;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Why a message was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The envelope or its payload has the wrong shape.
    Malformed,
    /// The target node, or a node the payload refers to, is not attached.
    StaleNode,
    /// No handler exists for the type tag.
    UnsupportedRpcType,
    /// The event type has no listener on the target.
    NoListener,
    /// Zero or several template methods match the call.
    AmbiguousOrMissingHandler,
    /// The handler returned an error.
    HandlerFailed,
    /// No attach request is pending for the answer.
    UnknownAttachRequest,
}

impl RejectReason {
    /// A short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::StaleNode => "stale-node",
            RejectReason::UnsupportedRpcType => "unsupported-rpc-type",
            RejectReason::NoListener => "no-listener",
            RejectReason::AmbiguousOrMissingHandler => "ambiguous-or-missing-handler",
            RejectReason::HandlerFailed => "handler-failed",
            RejectReason::UnknownAttachRequest => "unknown-attach-request",
        }
    }

    /// Whether the rejection goes to the session error feed.
    pub fn is_session_error(self) -> bool {
        matches!(
            self,
            RejectReason::AmbiguousOrMissingHandler | RejectReason::HandlerFailed
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcOutcome {
    /// The handler ran.
    Applied,
    /// The message was dropped.
    Rejected(RejectReason),
}

impl RpcOutcome {
    /// Whether the handler ran.
    pub fn is_applied(self) -> bool {
        matches!(self, RpcOutcome::Applied)
    }

    /// The rejection reason, if any.
    pub fn rejection(self) -> Option<RejectReason> {
        match self {
            RpcOutcome::Applied => None,
            RpcOutcome::Rejected(reason) => Some(reason),
        }
    }
}

/// Applies one kind of inbound message to the tree.
pub trait RpcHandler: Send + Sync {
    /// The type tag served.
    fn rpc_type(&self) -> &'static str;

    /// Applies `envelope` to its resolved target `node`.
    ///
    /// Expected conditions come back as [`RpcOutcome::Rejected`]. Errors
    /// count as malformed input when they stem from the payload's shape and
    /// as handler failures otherwise.
    fn apply(
        &self,
        tree: &mut StateTree,
        node: NodeKey,
        envelope: &RpcEnvelope,
    ) -> EngineResult<RpcOutcome>;
}

/// A handled message, as reported to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Target node, when the envelope could be read.
    pub node: Option<NodeId>,
    /// Type tag, when the envelope could be read.
    pub rpc_type: Option<String>,
    /// What happened.
    pub outcome: RpcOutcome,
    /// Error detail for rejections caused by an error.
    pub detail: Option<String>,
}

impl Dispatched {
    fn rejected(
        envelope: Option<&RpcEnvelope>,
        reason: RejectReason,
        detail: Option<String>,
    ) -> Self {
        Self {
            node: envelope.map(|e| e.node),
            rpc_type: envelope.map(|e| e.rpc_type.clone()),
            outcome: RpcOutcome::Rejected(reason),
            detail,
        }
    }
}

/// Routes messages to handlers by type tag.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<&'static str, Arc<dyn RpcHandler>>,
}

impl Dispatcher {
    /// Creates a dispatcher without handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher serving the four built-in message types.
    pub fn with_defaults(methods: Arc<MethodRegistry>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(EventHandler));
        dispatcher.register(Arc::new(PropertySyncHandler));
        dispatcher.register(Arc::new(MethodInvokeHandler::new(methods)));
        dispatcher.register(Arc::new(AttachExistingHandler));
        dispatcher
    }

    /// Adds a handler, replacing any handler for the same tag.
    pub fn register(&mut self, handler: Arc<dyn RpcHandler>) -> Option<Arc<dyn RpcHandler>> {
        self.handlers.insert(handler.rpc_type(), handler)
    }

    /// Whether `rpc_type` has a handler.
    pub fn handles(&self, rpc_type: &str) -> bool {
        self.handlers.contains_key(rpc_type)
    }

    /// Handles one raw message.
    pub fn dispatch(&self, tree: &mut StateTree, message: &serde_json::Value) -> Dispatched {
        let envelope = match RpcEnvelope::from_json(message) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "rejecting malformed message");
                return Dispatched::rejected(None, RejectReason::Malformed, Some(err.to_string()));
            }
        };
        trace!(node = %envelope.node, rpc_type = %envelope.rpc_type, "received");

        let node = match tree.get_by_id(envelope.node) {
            Lookup::Found(node) => node,
            Lookup::NotFound => {
                debug!(
                    node = %envelope.node,
                    rpc_type = %envelope.rpc_type,
                    "target is not attached"
                );
                return Dispatched::rejected(Some(&envelope), RejectReason::StaleNode, None);
            }
        };
        trace!(node = %envelope.node, "resolved");

        let Some(handler) = self.handlers.get(envelope.rpc_type.as_str()) else {
            warn!(rpc_type = %envelope.rpc_type, "no handler for message type");
            return Dispatched::rejected(Some(&envelope), RejectReason::UnsupportedRpcType, None);
        };

        match handler.apply(tree, node, &envelope) {
            Ok(RpcOutcome::Applied) => {
                trace!(node = %envelope.node, rpc_type = %envelope.rpc_type, "applied");
                Dispatched {
                    node: Some(envelope.node),
                    rpc_type: Some(envelope.rpc_type),
                    outcome: RpcOutcome::Applied,
                    detail: None,
                }
            }
            Ok(RpcOutcome::Rejected(reason)) => {
                debug!(node = %envelope.node, rpc_type = %envelope.rpc_type, %reason, "rejected");
                Dispatched::rejected(Some(&envelope), reason, None)
            }
            Err(err) => {
                let reason = classify(&err);
                if reason == RejectReason::Malformed {
                    warn!(
                        node = %envelope.node,
                        rpc_type = %envelope.rpc_type,
                        error = %err,
                        "rejecting malformed payload"
                    );
                } else {
                    error!(
                        node = %envelope.node,
                        rpc_type = %envelope.rpc_type,
                        error = %err,
                        "handler failed"
                    );
                }
                Dispatched::rejected(Some(&envelope), reason, Some(err.to_string()))
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.handlers.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("Dispatcher").field("handlers", &tags).finish()
    }
}

fn classify(err: &EngineError) -> RejectReason {
    match err {
        EngineError::Protocol(err) if err.is_structural() => RejectReason::Malformed,
        EngineError::AmbiguousOrMissingHandler { .. } => RejectReason::AmbiguousOrMissingHandler,
        _ => RejectReason::HandlerFailed,
    }
}
