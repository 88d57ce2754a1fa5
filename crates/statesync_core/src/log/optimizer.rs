//! Log compaction.
//!
//! Records are split into streams: one per map entry and one per list.
//! Map streams keep only their last record. List streams are replayed
//! against a model of the client list where every element is either `Old`
//! (known to the client before this cycle) or `New` (inserted this cycle).
//! Removing a `New` element cancels both the removal and that element of
//! its insert; surviving indices are then shifted past the cancelled
//! elements.

use super::TransactionLog;
use crate::change::{Change, ChangeRecord};
use crate::error::{CoreError, CoreResult};
use crate::feature::FeatureId;
use crate::types::NodeId;
use indexmap::IndexMap;
use tracing::warn;

/// Optimizes `log`, falling back to an unchanged copy if the records
/// contradict each other.
pub fn optimize(log: &TransactionLog) -> TransactionLog {
    match try_optimize(log) {
        Ok(optimized) => optimized,
        Err(err) => {
            warn!(
                error = %err,
                records = log.record_count(),
                "sending unoptimized transaction log"
            );
            log.clone()
        }
    }
}

/// Optimizes `log`. Fails with [`CoreError::OptimizerInvariant`] when a list
/// stream addresses an index that cannot exist.
pub fn try_optimize(log: &TransactionLog) -> CoreResult<TransactionLog> {
    let mut out = TransactionLog::new();
    for group in &log.groups {
        out.push_group(group.node, optimize_group(&group.records)?);
    }
    out.detached = log.detached.clone();
    Ok(out)
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum StreamKey<'a> {
    Map(NodeId, FeatureId, &'a str),
    List(NodeId, FeatureId),
}

fn optimize_group(records: &[ChangeRecord]) -> CoreResult<Vec<ChangeRecord>> {
    let mut streams: IndexMap<StreamKey<'_>, Vec<&ChangeRecord>> = IndexMap::new();
    for record in records {
        let key = match record.change.map_key() {
            Some(name) => StreamKey::Map(record.node, record.feature, name),
            None => StreamKey::List(record.node, record.feature),
        };
        streams.entry(key).or_default().push(record);
    }

    let mut out = Vec::with_capacity(records.len());
    for (key, stream) in streams {
        match key {
            StreamKey::Map(..) => out.extend(stream.last().map(|r| (*r).clone())),
            StreamKey::List(..) => out.extend(optimize_list(&stream)?),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Old,
    New { op: usize, element: usize },
}

/// Model of a client list. Unless the list was cleared, an unbounded run of
/// `Old` elements follows the materialized prefix.
struct ListModel {
    slots: Vec<Slot>,
    open_tail: bool,
}

impl ListModel {
    fn new(open_tail: bool) -> Self {
        Self {
            slots: Vec::new(),
            open_tail,
        }
    }

    fn materialize(&mut self, len: usize) -> CoreResult<()> {
        if self.slots.len() < len {
            if !self.open_tail {
                return Err(CoreError::optimizer(format!(
                    "index {} beyond cleared list of length {}",
                    len - 1,
                    self.slots.len()
                )));
            }
            self.slots.resize(len, Slot::Old);
        }
        Ok(())
    }

    fn insert(&mut self, index: usize, slots: impl IntoIterator<Item = Slot>) -> CoreResult<()> {
        self.materialize(index)?;
        self.slots.splice(index..index, slots);
        Ok(())
    }

    fn remove(&mut self, index: usize) -> CoreResult<Slot> {
        self.materialize(index + 1)?;
        Ok(self.slots.remove(index))
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.open_tail = false;
    }

    /// Cancelled elements currently placed before `index`.
    fn cancelled_before(&self, index: usize, cancelled: &[Vec<bool>]) -> usize {
        self.slots[..index.min(self.slots.len())]
            .iter()
            .filter(|slot| match slot {
                Slot::New { op, element } => cancelled[*op][*element],
                Slot::Old => false,
            })
            .count()
    }
}

fn inserted_len(change: &Change) -> usize {
    match change {
        Change::ListInsert { .. } | Change::ListInsertNode { .. } => 1,
        Change::ListInsertMany { values, .. } => values.len(),
        Change::ListInsertNodes { nodes, .. } => nodes.len(),
        _ => 0,
    }
}

fn new_slots(op: usize, len: usize) -> impl Iterator<Item = Slot> {
    (0..len).map(move |element| Slot::New { op, element })
}

fn optimize_list(stream: &[&ChangeRecord]) -> CoreResult<Vec<ChangeRecord>> {
    let start = stream
        .iter()
        .rposition(|r| r.change == Change::ListClear)
        .unwrap_or(0);
    let ops = &stream[start..];
    let open_tail = !matches!(ops.first().map(|r| &r.change), Some(Change::ListClear));

    // Pass 1: find which inserted elements are removed again.
    let mut cancelled: Vec<Vec<bool>> = ops
        .iter()
        .map(|r| vec![false; inserted_len(&r.change)])
        .collect();
    let mut cancelled_removals = vec![false; ops.len()];
    let mut model = ListModel::new(open_tail);
    for (i, record) in ops.iter().enumerate() {
        match &record.change {
            Change::ListClear => model.clear(),
            Change::ListRemove { index } => {
                if let Slot::New { op, element } = model.remove(*index)? {
                    cancelled[op][element] = true;
                    cancelled_removals[i] = true;
                }
            }
            change => {
                let index = change.index().unwrap_or(0);
                model.insert(index, new_slots(i, inserted_len(change)))?;
            }
        }
    }

    // Pass 2: replay again, emitting survivors at shifted indices.
    let mut out = Vec::with_capacity(ops.len());
    let mut model = ListModel::new(open_tail);
    for (i, record) in ops.iter().enumerate() {
        match &record.change {
            Change::ListClear => {
                model.clear();
                out.push((*record).clone());
            }
            Change::ListRemove { index } => {
                let shifted = index - model.cancelled_before(*index, &cancelled);
                model.remove(*index)?;
                if !cancelled_removals[i] {
                    out.push(with_change(record, Change::ListRemove { index: shifted }));
                }
            }
            change => {
                let index = change.index().unwrap_or(0);
                let shifted = index - model.cancelled_before(index, &cancelled);
                model.insert(index, new_slots(i, inserted_len(change)))?;
                if let Some(kept) = surviving_insert(change, shifted, &cancelled[i]) {
                    out.push(with_change(record, kept));
                }
            }
        }
    }
    Ok(out)
}

fn with_change(record: &ChangeRecord, change: Change) -> ChangeRecord {
    ChangeRecord::new(record.node, record.feature, change)
}

fn keep<T: Clone>(items: &[T], cancelled: &[bool]) -> Vec<T> {
    items
        .iter()
        .zip(cancelled)
        .filter(|(_, gone)| !**gone)
        .map(|(item, _)| item.clone())
        .collect()
}

fn surviving_insert(change: &Change, index: usize, cancelled: &[bool]) -> Option<Change> {
    if cancelled.iter().all(|gone| *gone) {
        return None;
    }
    Some(match change {
        Change::ListInsert { value, .. } => Change::ListInsert {
            index,
            value: value.clone(),
        },
        Change::ListInsertNode { node, .. } => Change::ListInsertNode { index, node: *node },
        Change::ListInsertMany { values, .. } => Change::ListInsertMany {
            index,
            values: keep(values, cancelled),
        },
        Change::ListInsertNodes { nodes, .. } => Change::ListInsertNodes {
            index,
            nodes: keep(nodes, cancelled),
        },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureKind;
    use proptest::prelude::*;
    use statesync_codec::Value;

    const NODE: NodeId = NodeId(1);

    fn prop(change: Change) -> ChangeRecord {
        ChangeRecord::new(NODE, FeatureKind::Properties.id(), change)
    }

    fn list(change: Change) -> ChangeRecord {
        ChangeRecord::new(NODE, FeatureKind::ClientHandlers.id(), change)
    }

    fn put(key: &str, value: impl Into<Value>) -> ChangeRecord {
        prop(Change::Put {
            key: key.into(),
            value: value.into(),
        })
    }

    fn insert(index: usize, value: &str) -> ChangeRecord {
        list(Change::ListInsert {
            index,
            value: value.into(),
        })
    }

    fn remove(index: usize) -> ChangeRecord {
        list(Change::ListRemove { index })
    }

    fn run(records: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
        try_optimize(&TransactionLog::from_records(records))
            .unwrap()
            .records()
            .cloned()
            .collect()
    }

    #[test]
    fn last_put_wins() {
        let out = run(vec![
            put("value", 1.0),
            put("value", 1.0),
            put("other", 2i64),
            put("value", 3.0),
        ]);
        assert_eq!(out, vec![put("value", 3.0), put("other", 2i64)]);
    }

    #[test]
    fn put_then_remove_is_remove_and_vice_versa() {
        let removal = prop(Change::Remove { key: "a".into() });
        assert_eq!(run(vec![put("a", 1i64), removal.clone()]), vec![removal.clone()]);
        assert_eq!(run(vec![removal, put("a", 1i64)]), vec![put("a", 1i64)]);
    }

    #[test]
    fn insert_then_remove_cancels() {
        assert!(run(vec![insert(0, "x"), remove(0)]).is_empty());
    }

    #[test]
    fn removal_of_old_element_is_kept_and_shifted() {
        // Client list is [o0, o1]. Insert n at 0, remove o0 (index 1), then
        // remove n (index 0). Only the removal of o0 survives, at index 0.
        let out = run(vec![insert(0, "n"), remove(1), remove(0)]);
        assert_eq!(out, vec![remove(0)]);
    }

    #[test]
    fn surviving_inserts_are_shifted_past_cancelled_ones() {
        let out = run(vec![insert(0, "a"), insert(1, "b"), remove(0)]);
        assert_eq!(out, vec![insert(0, "b")]);
    }

    #[test]
    fn batch_inserts_cancel_element_by_element() {
        let batch = list(Change::ListInsertMany {
            index: 0,
            values: vec!["a".into(), "b".into(), "c".into()],
        });
        let out = run(vec![batch, remove(1)]);
        assert_eq!(
            out,
            vec![list(Change::ListInsertMany {
                index: 0,
                values: vec!["a".into(), "c".into()],
            })]
        );
    }

    #[test]
    fn cancellation_follows_slots_not_values() {
        // Same value inserted twice, one copy removed.
        let out = run(vec![insert(0, "x"), insert(1, "x"), remove(1)]);
        assert_eq!(out, vec![insert(0, "x")]);
    }

    #[test]
    fn everything_before_last_clear_is_dropped() {
        let out = run(vec![
            insert(0, "a"),
            list(Change::ListClear),
            insert(0, "b"),
            list(Change::ListClear),
            insert(0, "c"),
        ]);
        assert_eq!(out, vec![list(Change::ListClear), insert(0, "c")]);
    }

    #[test]
    fn streams_are_emitted_in_first_appearance_order() {
        let out = run(vec![put("b", 1i64), insert(0, "x"), put("a", 1i64), put("b", 2i64)]);
        assert_eq!(out, vec![put("b", 2i64), insert(0, "x"), put("a", 1i64)]);
    }

    #[test]
    fn contradictory_list_fails_open() {
        let log = TransactionLog::from_records(vec![list(Change::ListClear), remove(0)]);
        assert!(matches!(
            try_optimize(&log),
            Err(CoreError::OptimizerInvariant { .. })
        ));
        assert_eq!(optimize(&log), log);
    }

    #[test]
    fn optimizing_twice_changes_nothing() {
        let log = TransactionLog::from_records(vec![
            insert(0, "a"),
            insert(0, "b"),
            remove(3),
            insert(2, "c"),
            remove(1),
            put("k", 1i64),
            remove(0),
        ]);
        let once = try_optimize(&log).unwrap();
        let twice = try_optimize(&once).unwrap();
        assert_eq!(once, twice);
    }

    /// Turns raw `(kind, pick)` steps into list operations that are valid
    /// against a client list of `initial` elements.
    fn script(initial: usize, steps: &[(u8, usize)]) -> Vec<ChangeRecord> {
        let mut len = initial;
        let mut out = Vec::new();
        for (i, &(kind, pick)) in steps.iter().enumerate() {
            let change = match kind {
                0..=2 => {
                    let index = pick % (len + 1);
                    len += 1;
                    Change::ListInsert {
                        index,
                        value: format!("v{i}").into(),
                    }
                }
                3 => {
                    let index = pick % (len + 1);
                    len += 2;
                    Change::ListInsertMany {
                        index,
                        values: vec![format!("v{i}a").into(), format!("v{i}b").into()],
                    }
                }
                4 | 5 if len > 0 => {
                    let index = pick % len;
                    len -= 1;
                    Change::ListRemove { index }
                }
                4 | 5 => continue,
                _ => {
                    len = 0;
                    Change::ListClear
                }
            };
            out.push(list(change));
        }
        out
    }

    fn replay(initial: usize, records: &[ChangeRecord]) -> Vec<Value> {
        let mut items: Vec<Value> = (0..initial).map(|i| Value::from(format!("old{i}"))).collect();
        for record in records {
            match &record.change {
                Change::ListInsert { index, value } => items.insert(*index, value.clone()),
                Change::ListInsertMany { index, values } => {
                    items.splice(*index..*index, values.iter().cloned());
                }
                Change::ListRemove { index } => {
                    items.remove(*index);
                }
                Change::ListClear => items.clear(),
                other => panic!("unexpected change {other:?}"),
            }
        }
        items
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn optimized_list_replays_like_raw_list(
            initial in 0usize..4,
            steps in prop::collection::vec((0u8..7, any::<usize>()), 0..24),
        ) {
            let raw = script(initial, &steps);
            let optimized = run(raw.clone());
            prop_assert!(optimized.len() <= raw.len());
            prop_assert_eq!(replay(initial, &optimized), replay(initial, &raw));
        }

        #[test]
        fn list_optimization_is_idempotent(
            initial in 0usize..4,
            steps in prop::collection::vec((0u8..7, any::<usize>()), 0..24),
        ) {
            let log = TransactionLog::from_records(script(initial, &steps));
            let once = try_optimize(&log).unwrap();
            let twice = try_optimize(&once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
