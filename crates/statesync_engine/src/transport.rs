//! Outbound transport abstraction.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use statesync_protocol::{ClientModel, EncodedPayload};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Carries encoded payloads to the client.
///
/// Implementations must deliver the payloads of one session in the order
/// they are sent. A send either delivers the whole payload or fails, in which
/// case the session keeps it queued and sends it again unchanged.
pub trait DiffTransport: Send + Sync {
    /// Sends one payload.
    fn send(&self, payload: &EncodedPayload) -> EngineResult<()>;

    /// Checks if the transport can send.
    fn is_connected(&self) -> bool;

    /// Closes the transport.
    fn close(&self) -> EngineResult<()>;
}

/// A transport recording every payload, for tests.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    failures: AtomicU32,
    fatal: AtomicBool,
    attempts: AtomicU32,
    sent: Mutex<Vec<EncodedPayload>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            failures: AtomicU32::new(0),
            fatal: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next `count` sends fail with a retryable error.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Makes failures fatal instead of retryable.
    pub fn set_fatal(&self, fatal: bool) {
        self.fatal.store(fatal, Ordering::SeqCst);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Payloads delivered so far.
    pub fn sent(&self) -> Vec<EncodedPayload> {
        self.sent.lock().clone()
    }

    /// Sync ids delivered so far.
    pub fn sent_ids(&self) -> Vec<u64> {
        self.sent.lock().iter().map(|p| p.sync_id).collect()
    }

    /// Number of send calls, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffTransport for MockTransport {
    fn send(&self, payload: &EncodedPayload) -> EngineResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(if self.fatal.load(Ordering::SeqCst) {
                EngineError::transport_fatal("mock send failure")
            } else {
                EngineError::transport_retryable("mock send failure")
            });
        }
        self.sent.lock().push(payload.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A transport feeding payloads straight into a [`ClientModel`].
///
/// Payloads go through their JSON text form, so the loopback exercises the
/// same encoding a network transport would.
#[derive(Debug)]
pub struct Loopback {
    client: Mutex<ClientModel>,
    connected: AtomicBool,
}

impl Loopback {
    /// Creates a loopback to a strict client model.
    pub fn new() -> Self {
        Self::with_client(ClientModel::strict())
    }

    /// Creates a loopback to the given client model.
    pub fn with_client(client: ClientModel) -> Self {
        Self {
            client: Mutex::new(client),
            connected: AtomicBool::new(true),
        }
    }

    /// Renders the client document.
    pub fn render(&self) -> serde_json::Value {
        self.client.lock().render()
    }

    /// Runs `f` with the client model.
    pub fn with_model<R>(&self, f: impl FnOnce(&ClientModel) -> R) -> R {
        f(&self.client.lock())
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffTransport for Loopback {
    fn send(&self, payload: &EncodedPayload) -> EngineResult<()> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let text = payload.to_json()?;
        let received = EncodedPayload::from_json(&text)?;
        self.client.lock().apply_payload(&received)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
