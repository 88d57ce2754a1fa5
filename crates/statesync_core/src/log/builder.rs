use super::TransactionLog;
use crate::tree::StateTree;
use crate::types::NodeId;

/// Counters describing one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Registered nodes walked.
    pub nodes_visited: usize,
    /// Detached nodes whose queues were swept.
    pub nodes_swept: usize,
}

/// Collects the queued records of `tree` into one log and resets the
/// tracker for the next cycle.
pub fn build(tree: &mut StateTree) -> TransactionLog {
    build_with_stats(tree).0
}

/// Like [`build`], also reporting counters.
///
/// The document group comes first. Registered nodes follow in pre-order
/// from the root, so a node's slot record always precedes the node's own
/// records. Detached nodes left in the dirty set are swept without
/// contributing records.
pub fn build_with_stats(tree: &mut StateTree) -> (TransactionLog, BuildStats) {
    let mut log = TransactionLog::new();
    let mut stats = BuildStats::default();
    if tree.tracker.is_clean() {
        return (log, stats);
    }

    log.push_group(NodeId::DOCUMENT, tree.tracker.take_document());

    let mut dirty = tree.tracker.take_dirty();
    if let Some(root) = tree.root {
        for key in tree.pre_order(root) {
            let Some(node) = tree.nodes.get_mut(&key.slot) else {
                continue;
            };
            stats.nodes_visited += 1;
            node.seen = true;
            if !node.dirty {
                continue;
            }
            node.dirty = false;
            dirty.shift_remove(&key);
            if let Some(id) = node.id {
                log.push_group(id, std::mem::take(&mut node.queue));
            }
        }
    }

    for key in dirty {
        if let Some(node) = tree.nodes.get_mut(&key.slot) {
            node.queue.clear();
            node.dirty = false;
            node.removed = false;
            stats.nodes_swept += 1;
        }
    }
    log.detached = tree.tracker.take_detached();
    (log, stats)
}
