//! Transaction logs: building them from a tree and optimizing them.

mod builder;
mod optimizer;

pub use builder::{build, build_with_stats, BuildStats};
pub use optimizer::{optimize, try_optimize};

use crate::change::ChangeRecord;
use crate::types::NodeId;

/// All records of one node within a log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogGroup {
    /// The node the records target.
    pub node: NodeId,
    /// Records in the order they were made.
    pub records: Vec<ChangeRecord>,
}

/// The ordered changes of one flush cycle.
///
/// Groups appear in visitation order: the document first, then ancestors
/// before descendants and siblings in slot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionLog {
    /// Groups in emit order.
    pub groups: Vec<LogGroup>,
    /// Ids the client had seen that were detached during the cycle.
    pub detached: Vec<NodeId>,
}

impl TransactionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a group, merging into the last one if it targets the same
    /// node. Empty groups are skipped.
    pub fn push_group(&mut self, node: NodeId, records: Vec<ChangeRecord>) {
        if records.is_empty() {
            return;
        }
        match self.groups.last_mut() {
            Some(last) if last.node == node => last.records.extend(records),
            _ => self.groups.push(LogGroup { node, records }),
        }
    }

    /// True when the log holds no record.
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.records.is_empty())
    }

    /// Number of records.
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }

    /// Records in emit order.
    pub fn records(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.groups.iter().flat_map(|g| g.records.iter())
    }

    /// Builds a log from a flat record sequence, grouping consecutive
    /// records of the same node.
    pub fn from_records(records: impl IntoIterator<Item = ChangeRecord>) -> Self {
        let mut log = Self::new();
        for record in records {
            let node = record.node;
            log.push_group(node, vec![record]);
        }
        log
    }
}
