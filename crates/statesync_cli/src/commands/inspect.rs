//! Inspect command implementation.

use super::PayloadFile;
use serde::Serialize;
use statesync_core::feature::descriptor;
use statesync_core::FeatureId;
use statesync_protocol::{ChangeType, WireChange};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Payload inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// File path.
    pub path: String,
    /// Sync ids carried by the file.
    pub sync_ids: Vec<u64>,
    /// Total number of changes.
    pub change_count: usize,
    /// Number of distinct target nodes.
    pub target_count: usize,
    /// Change counts by wire type.
    pub by_type: BTreeMap<String, usize>,
    /// Change counts by feature wire key.
    pub by_feature: BTreeMap<String, usize>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

/// Reads a payload file and counts its changes.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let file = PayloadFile::read(path)?;
    let changes = file.changes();
    Ok(InspectResult {
        path: path.display().to_string(),
        sync_ids: file.sync_ids(),
        change_count: changes.len(),
        target_count: changes.iter().map(|c| c.id).collect::<BTreeSet<_>>().len(),
        by_type: count(&changes, |c| c.kind.as_str().to_string()),
        by_feature: count(&changes, feature_name),
    })
}

fn count(changes: &[&WireChange], key: impl Fn(&WireChange) -> String) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for change in changes {
        *counts.entry(key(change)).or_insert(0) += 1;
    }
    counts
}

fn feature_name(change: &WireChange) -> String {
    descriptor(FeatureId(change.feat))
        .map(|d| d.wire_key.to_string())
        .unwrap_or_else(|| format!("unknown({})", change.feat))
}

fn print_text_output(result: &InspectResult) {
    println!("Statesync Payload Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    if !result.sync_ids.is_empty() {
        let ids: Vec<String> = result.sync_ids.iter().map(u64::to_string).collect();
        println!("Sync ids: {}", ids.join(", "));
    }
    println!();
    println!("Changes: {}", result.change_count);
    println!("Targets: {}", result.target_count);
    println!();
    println!("By type:");
    for (name, n) in &result.by_type {
        println!("  {:16} {}", name, n);
    }
    println!();
    println!("By feature:");
    for (name, n) in &result.by_feature {
        println!("  {:16} {}", name, n);
    }
    if result.by_type.contains_key(ChangeType::ListClear.as_str()) {
        println!();
        println!("Note: payload clears at least one list");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_by_type_and_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(
            &path,
            json!({"syncId": 4, "changes": [
                {"id": 0, "type": "putNode", "feat": 0, "key": "root", "value": 1},
                {"id": 1, "type": "put", "feat": 2, "key": "a", "value": 1},
                {"id": 1, "type": "put", "feat": 2, "key": "b", "value": 2},
                {"id": 1, "type": "listInsertNodes", "feat": 3, "key": "children",
                 "index": 0, "value": [2, 3]},
                {"id": 9, "type": "listClear", "feat": 42, "key": "?"}
            ]})
            .to_string(),
        )
        .unwrap();

        let result = inspect(&path).unwrap();
        assert_eq!(result.sync_ids, vec![4]);
        assert_eq!(result.change_count, 5);
        assert_eq!(result.target_count, 3);
        assert_eq!(result.by_type["put"], 2);
        assert_eq!(result.by_type["listInsertNodes"], 1);
        assert_eq!(result.by_feature["properties"], 2);
        assert_eq!(result.by_feature["unknown(42)"], 1);

        let rendered = serde_json::to_value(&result).unwrap();
        assert_eq!(rendered["by_type"]["putNode"], json!(1));
    }
}
