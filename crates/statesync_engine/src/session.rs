//! Sessions.
//!
//! A session owns one state tree behind one exclusive lock. Application
//! code, inbound RPC handling and flushes all take that lock, so the tree
//! only ever sees one mutator at a time. Sessions share nothing with each
//! other and run fully in parallel.
//!
//! Transport I/O never happens under the tree lock. Payloads waiting for
//! delivery sit in a separate outbox. A flush pushes its payload while it
//! still holds the tree lock, so the outbox is always in `syncId` order.
//! Senders are serialized by their own lock, which is never held together
//! with the tree lock. Lock order is tree, then outbox, and send, then
//! outbox; the outbox lock is only held for a push, a peek or a pop.

use crate::config::SessionConfig;
use crate::dispatcher::{Dispatched, Dispatcher, RpcOutcome};
use crate::error::{EngineError, EngineResult};
use crate::error_feed::ErrorFeed;
use crate::methods::MethodRegistry;
use crate::transport::DiffTransport;
use parking_lot::{Mutex, MutexGuard};
use statesync_core::{build_with_stats, try_optimize, NodeKey, StateTree, TransactionLog};
use statesync_protocol::{decode_batch, encode_payload, EncodedPayload};
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Unique identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Numbers reported by a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Records produced by the builder.
    pub raw_records: usize,
    /// Records left after optimizing.
    pub optimized_records: usize,
    /// Nodes the builder visited.
    pub nodes_visited: usize,
    /// Nodes reported detached since the previous flush.
    pub nodes_detached: usize,
    /// Whether the optimizer failed and the raw log was used.
    pub optimizer_failed_open: bool,
}

/// Result of a flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushOutput {
    /// The encoded payload, or `None` when nothing changed.
    pub payload: Option<EncodedPayload>,
    /// Statistics.
    pub stats: FlushStats,
}

/// Result of [`Session::flush_and_send`].
#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    /// Sync ids delivered by this call, in order.
    pub delivered: Vec<u64>,
    /// Statistics of the flush that preceded the send.
    pub stats: FlushStats,
}

struct SessionState {
    tree: StateTree,
    next_sync_id: u64,
}

/// Exclusive access to a session's tree.
pub struct TreeGuard<'a> {
    state: MutexGuard<'a, SessionState>,
}

impl Deref for TreeGuard<'_> {
    type Target = StateTree;

    fn deref(&self) -> &StateTree {
        &self.state.tree
    }
}

impl DerefMut for TreeGuard<'_> {
    fn deref_mut(&mut self) -> &mut StateTree {
        &mut self.state.tree
    }
}

/// One client's synchronized tree.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    state: Mutex<SessionState>,
    outbox: Mutex<VecDeque<EncodedPayload>>,
    sending: Mutex<()>,
    dispatcher: Dispatcher,
    methods: Arc<MethodRegistry>,
    errors: ErrorFeed,
}

impl Session {
    /// Creates a session without template methods.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_methods(config, Arc::new(MethodRegistry::empty()))
    }

    /// Creates a session resolving template methods in `methods`.
    pub fn with_methods(config: SessionConfig, methods: Arc<MethodRegistry>) -> Self {
        let dispatcher = Dispatcher::with_defaults(methods.clone());
        Self::with_dispatcher(config, methods, dispatcher)
    }

    /// Creates a session with a custom dispatcher.
    pub fn with_dispatcher(
        config: SessionConfig,
        methods: Arc<MethodRegistry>,
        dispatcher: Dispatcher,
    ) -> Self {
        let errors = ErrorFeed::new(config.error_history);
        Self {
            id: SessionId::new(),
            config,
            state: Mutex::new(SessionState {
                tree: StateTree::new(),
                next_sync_id: 1,
            }),
            outbox: Mutex::new(VecDeque::new()),
            sending: Mutex::new(()),
            dispatcher,
            methods,
            errors,
        }
    }

    /// The session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session error feed.
    pub fn errors(&self) -> &ErrorFeed {
        &self.errors
    }

    /// The template method registry.
    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    /// Locks the tree. Blocks while another thread holds it.
    pub fn lock(&self) -> TreeGuard<'_> {
        TreeGuard {
            state: self.state.lock(),
        }
    }

    /// Runs `f` with the tree locked.
    pub fn with_tree<R>(&self, f: impl FnOnce(&mut StateTree) -> R) -> R {
        f(&mut self.lock())
    }

    /// Publishes the template methods of `node`'s tag to the client.
    pub fn publish_handlers(&self, node: NodeKey) -> EngineResult<()> {
        let mut tree = self.lock();
        self.methods.publish_handlers(&mut tree, node)?;
        Ok(())
    }

    /// Number of payloads waiting for delivery.
    pub fn unsent_count(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Handles an inbound batch: a JSON array of messages or a single one.
    ///
    /// Messages are applied in order and each resolves its target afresh,
    /// so a message sees the effects of the ones before it. A rejected
    /// message does not stop the batch.
    pub fn handle_invocations(&self, text: &str) -> EngineResult<Vec<RpcOutcome>> {
        let messages = match decode_batch(text) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(session = %self.id, error = %err, "rejecting undecodable batch");
                return Err(err.into());
            }
        };
        if messages.len() > self.config.max_batch_size {
            warn!(session = %self.id, size = messages.len(), "rejecting oversized batch");
            return Err(EngineError::BatchTooLarge {
                size: messages.len(),
                max: self.config.max_batch_size,
            });
        }

        let mut tree = self.lock();
        Ok(messages
            .iter()
            .map(|message| {
                let dispatched = self.dispatcher.dispatch(&mut tree, message);
                self.report(&dispatched);
                dispatched.outcome
            })
            .collect())
    }

    fn report(&self, dispatched: &Dispatched) {
        let RpcOutcome::Rejected(reason) = dispatched.outcome else {
            return;
        };
        if !reason.is_session_error() {
            return;
        }
        let (Some(node), Some(rpc_type)) = (dispatched.node, dispatched.rpc_type.as_deref()) else {
            return;
        };
        let message = dispatched.detail.clone().unwrap_or_else(|| reason.to_string());
        let sequence = self.errors.publish(node, rpc_type, reason, message);
        error!(session = %self.id, %node, rpc_type, %reason, sequence, "published session error");
    }

    /// Builds, optimizes and encodes everything changed since the last
    /// flush.
    ///
    /// The payload is returned to the caller and not queued for
    /// [`flush_and_send`](Self::flush_and_send).
    pub fn flush(&self) -> FlushOutput {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut SessionState) -> FlushOutput {
        let (raw, build) = build_with_stats(&mut state.tree);
        let mut stats = FlushStats {
            raw_records: raw.record_count(),
            nodes_visited: build.nodes_visited,
            nodes_detached: raw.detached.len(),
            ..FlushStats::default()
        };

        let log = if self.config.optimize {
            match try_optimize(&raw) {
                Ok(log) => log,
                Err(err) => {
                    warn!(
                        session = %self.id,
                        error = %err,
                        "optimizer failed, sending the raw log"
                    );
                    stats.optimizer_failed_open = true;
                    raw
                }
            }
        } else {
            raw
        };
        stats.optimized_records = log.record_count();

        let payload = self.encode(state, &log);
        debug!(
            session = %self.id,
            sync_id = payload.as_ref().map(|p| p.sync_id),
            raw = stats.raw_records,
            optimized = stats.optimized_records,
            visited = stats.nodes_visited,
            detached = stats.nodes_detached,
            failed_open = stats.optimizer_failed_open,
            "flushed"
        );
        FlushOutput { payload, stats }
    }

    fn encode(&self, state: &mut SessionState, log: &TransactionLog) -> Option<EncodedPayload> {
        if log.is_empty() {
            return None;
        }
        let payload = encode_payload(state.next_sync_id, log);
        state.next_sync_id += 1;
        Some(payload)
    }

    /// Flushes and delivers every queued payload in order.
    ///
    /// Each payload gets up to `retry.max_attempts` sends with backoff. When
    /// a payload still fails, it stays at the head of the queue together with
    /// everything after it, and the error is returned. The next call sends
    /// it again unchanged, `syncId` included.
    ///
    /// Must not be called while this thread holds the tree through
    /// [`lock`](Self::lock).
    pub fn flush_and_send(&self, transport: &dyn DiffTransport) -> EngineResult<SendReport> {
        let stats = {
            let mut state = self.state.lock();
            let output = self.flush_locked(&mut state);
            if let Some(payload) = output.payload {
                self.outbox.lock().push_back(payload);
            }
            output.stats
        };

        let _sending = self.sending.lock();
        let mut delivered = Vec::new();
        loop {
            let Some(payload) = self.outbox.lock().front().cloned() else {
                break;
            };
            self.send_with_retry(transport, &payload)?;
            delivered.push(payload.sync_id);
            self.outbox.lock().pop_front();
        }
        Ok(SendReport { delivered, stats })
    }

    fn send_with_retry(
        &self,
        transport: &dyn DiffTransport,
        payload: &EncodedPayload,
    ) -> EngineResult<()> {
        let retry = &self.config.retry;
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            match transport.send(payload) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    debug!(
                        session = %self.id,
                        sync_id = payload.sync_id,
                        attempt,
                        error = %err,
                        "send failed, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        session = %self.id,
                        sync_id = payload.sync_id,
                        error = %err,
                        "send failed, payload stays queued"
                    );
                    return Err(err);
                }
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::transport::MockTransport;
    use statesync_core::FeatureKind;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn quick_retry() -> SessionConfig {
        SessionConfig::new().with_retry(
            RetryConfig::new(2)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
    }

    #[test]
    fn session_ids_are_unique() {
        let a = Session::new(SessionConfig::default());
        let b = Session::new(SessionConfig::default());
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("session:"));
    }

    #[test]
    fn flush_numbers_payloads() {
        let session = Session::new(SessionConfig::default());
        session.with_tree(|tree| {
            let root = tree.create_node(&[FeatureKind::Properties]).unwrap();
            tree.set_property(root, "value", 0.0).unwrap();
            tree.attach_root(root).unwrap();
        });

        let first = session.flush();
        let payload = first.payload.unwrap();
        assert_eq!(payload.sync_id, 1);
        assert_eq!(first.stats.raw_records, 2);
        assert_eq!(first.stats.optimized_records, 2);

        let second = session.flush();
        assert!(second.payload.is_none());
        assert_eq!(second.stats.raw_records, 0);
    }

    #[test]
    fn optimizer_can_be_disabled() {
        let session = Session::new(SessionConfig::new().with_optimize(false));
        let root = session.with_tree(|tree| {
            let root = tree.create_node(&[FeatureKind::Properties]).unwrap();
            tree.attach_root(root).unwrap();
            root
        });
        session.flush();
        {
            let mut tree = session.lock();
            tree.set_property(root, "value", 1.0).unwrap();
            tree.set_property(root, "value", 2.0).unwrap();
        }
        let output = session.flush();
        assert_eq!(output.stats.optimized_records, 2);
        assert_eq!(output.payload.unwrap().len(), 2);
    }

    #[test]
    fn failed_send_is_resent_verbatim() {
        let session = Session::new(quick_retry());
        let transport = MockTransport::new();
        session.with_tree(|tree| {
            let root = tree.create_element("body");
            tree.attach_root(root).unwrap();
        });

        transport.fail_next(2);
        assert!(session.flush_and_send(&transport).is_err());
        assert_eq!(session.unsent_count(), 1);
        assert_eq!(transport.attempts(), 2);

        let report = session.flush_and_send(&transport).unwrap();
        assert_eq!(report.delivered, vec![1]);
        assert_eq!(transport.sent_ids(), vec![1]);
        assert_eq!(session.unsent_count(), 0);
    }

    #[test]
    fn retry_recovers_within_one_call() {
        let session = Session::new(quick_retry());
        let transport = MockTransport::new();
        session.with_tree(|tree| {
            let root = tree.create_element("body");
            tree.attach_root(root).unwrap();
        });

        transport.fail_next(1);
        let report = session.flush_and_send(&transport).unwrap();
        assert_eq!(report.delivered, vec![1]);
        assert_eq!(transport.attempts(), 2);
    }

    #[test]
    fn queued_payloads_keep_their_order() {
        let session = Session::new(SessionConfig::new().with_retry(RetryConfig::no_retry()));
        let transport = MockTransport::new();
        let root = session.with_tree(|tree| {
            let root = tree.create_element("body");
            tree.attach_root(root).unwrap();
            root
        });

        transport.set_connected(false);
        assert!(session.flush_and_send(&transport).is_err());
        session.with_tree(|tree| tree.set_property(root, "value", 1).unwrap());
        assert!(session.flush_and_send(&transport).is_err());
        assert_eq!(session.unsent_count(), 2);

        transport.set_connected(true);
        let report = session.flush_and_send(&transport).unwrap();
        assert_eq!(report.delivered, vec![1, 2]);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let session = Session::new(SessionConfig::new().with_max_batch_size(1));
        let err = session
            .handle_invocations(r#"[{"node":1,"type":"event"},{"node":1,"type":"event"}]"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::BatchTooLarge { size: 2, max: 1 }));
    }

    #[test]
    fn tree_holder_can_read_outbox_during_send() {
        let session = Arc::new(Session::new(SessionConfig::default()));
        session.with_tree(|tree| {
            let root = tree.create_element("body");
            tree.attach_root(root).unwrap();
        });
        let (done, finished) = mpsc::channel();

        let holder = {
            let session = session.clone();
            let done = done.clone();
            thread::spawn(move || {
                let _tree = session.lock();
                thread::sleep(Duration::from_millis(200));
                let unsent = session.unsent_count();
                done.send(("holder", unsent)).unwrap();
            })
        };
        let sender = {
            let session = session.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                let report = session.flush_and_send(&MockTransport::new()).unwrap();
                done.send(("sender", report.delivered.len())).unwrap();
            })
        };

        let mut seen = Vec::new();
        for _ in 0..2 {
            let (who, _) = finished
                .recv_timeout(Duration::from_secs(5))
                .expect("session locks deadlocked");
            seen.push(who);
        }
        holder.join().unwrap();
        sender.join().unwrap();
        seen.sort();
        assert_eq!(seen, vec!["holder", "sender"]);
        assert_eq!(session.unsent_count(), 0);
    }

    #[test]
    fn concurrent_senders_deliver_in_sync_id_order() {
        let session = Arc::new(Session::new(SessionConfig::default()));
        let transport = Arc::new(MockTransport::new());
        let root = session.with_tree(|tree| {
            let root = tree.create_element("body");
            tree.attach_root(root).unwrap();
            root
        });

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let session = session.clone();
                let transport = transport.clone();
                thread::spawn(move || {
                    for j in 0..5 {
                        session.with_tree(|tree| {
                            tree.set_property(root, "value", i * 10 + j).unwrap()
                        });
                        session.flush_and_send(transport.as_ref()).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let ids = transport.sent_ids();
        assert_eq!(ids, (1..=ids.len() as u64).collect::<Vec<_>>());
        assert_eq!(session.unsent_count(), 0);
    }
}
