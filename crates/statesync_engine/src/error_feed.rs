//! Session error channel.
//!
//! Rejections that point at a programming error on the server side (a
//! template method call nobody can answer, a handler that failed) are
//! published here in addition to being logged. Consumers either subscribe
//! to a channel or poll the bounded history with a sequence cursor.

use crate::dispatcher::RejectReason;
use parking_lot::RwLock;
use statesync_core::NodeId;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// An error raised while handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    /// Position in the feed, starting at 1.
    pub sequence: u64,
    /// Target node of the message.
    pub node: NodeId,
    /// Type tag of the message.
    pub rpc_type: String,
    /// Why the message was rejected.
    pub reason: RejectReason,
    /// Human-readable detail.
    pub message: String,
}

/// Distributes session errors to subscribers.
pub struct ErrorFeed {
    subscribers: RwLock<Vec<Sender<SessionError>>>,
    history: RwLock<History>,
    max_history: usize,
}

#[derive(Default)]
struct History {
    last_sequence: u64,
    errors: VecDeque<SessionError>,
}

impl ErrorFeed {
    /// Creates a feed keeping up to `max_history` errors.
    pub fn new(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(History::default()),
            max_history,
        }
    }

    /// Returns a receiver for all future errors.
    pub fn subscribe(&self) -> Receiver<SessionError> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes an error and returns its sequence number.
    pub fn publish(
        &self,
        node: NodeId,
        rpc_type: &str,
        reason: RejectReason,
        message: String,
    ) -> u64 {
        let error = {
            let mut history = self.history.write();
            history.last_sequence += 1;
            let error = SessionError {
                sequence: history.last_sequence,
                node,
                rpc_type: rpc_type.to_string(),
                reason,
                message,
            };
            history.errors.push_back(error.clone());
            while history.errors.len() > self.max_history {
                history.errors.pop_front();
            }
            error
        };
        let sequence = error.sequence;

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(error.clone()).is_ok());
        sequence
    }

    /// Errors with a sequence number above `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<SessionError> {
        self.history
            .read()
            .errors
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// The latest sequence number, 0 when nothing was published.
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().last_sequence
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ErrorFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for ErrorFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorFeed")
            .field("subscribers", &self.subscriber_count())
            .field("latest_sequence", &self.latest_sequence())
            .field("max_history", &self.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(feed: &ErrorFeed, n: u32) -> u64 {
        feed.publish(
            NodeId(n),
            "publishedEventHandler",
            RejectReason::AmbiguousOrMissingHandler,
            format!("error {n}"),
        )
    }

    #[test]
    fn subscribers_receive_errors_in_order() {
        let feed = ErrorFeed::default();
        let rx = feed.subscribe();
        publish(&feed, 1);
        publish(&feed, 2);

        assert_eq!(rx.recv().unwrap().node, NodeId(1));
        assert_eq!(rx.recv().unwrap().node, NodeId(2));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = ErrorFeed::default();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        drop(rx);
        publish(&feed, 1);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_uses_cursor_and_bounded_history() {
        let feed = ErrorFeed::new(2);
        for n in 1..=3 {
            publish(&feed, n);
        }
        assert_eq!(feed.latest_sequence(), 3);

        let polled = feed.poll(0, 10);
        assert_eq!(polled.len(), 2);
        assert_eq!(polled[0].sequence, 2);
        assert_eq!(feed.poll(2, 10).len(), 1);
        assert!(feed.poll(3, 10).is_empty());
    }
}
