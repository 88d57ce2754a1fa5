//! CLI command implementations.

pub mod apply;
pub mod demo;
pub mod inspect;

use serde::Deserialize;
use statesync_protocol::{EncodedPayload, WireChange};
use std::path::Path;

/// Contents of a payload file.
///
/// A file holds one numbered payload, an array of them, or a bare change
/// array as sent by transports that drop the `syncId` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PayloadFile {
    /// One numbered payload.
    One(EncodedPayload),
    /// Several numbered payloads, in send order.
    Many(Vec<EncodedPayload>),
    /// Changes without a sync id.
    Changes(Vec<WireChange>),
}

impl PayloadFile {
    /// Reads and parses a payload file.
    pub fn read(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        let file = serde_json::from_str(&text)
            .map_err(|e| format!("{} is not a payload file: {}", path.display(), e))?;
        Ok(file)
    }

    /// Every change in the file, in apply order.
    pub fn changes(&self) -> Vec<&WireChange> {
        match self {
            PayloadFile::One(payload) => payload.changes.iter().collect(),
            PayloadFile::Many(payloads) => payloads.iter().flat_map(|p| p.changes.iter()).collect(),
            PayloadFile::Changes(changes) => changes.iter().collect(),
        }
    }

    /// Sync ids carried by the file.
    pub fn sync_ids(&self) -> Vec<u64> {
        match self {
            PayloadFile::One(payload) => vec![payload.sync_id],
            PayloadFile::Many(payloads) => payloads.iter().map(|p| p.sync_id).collect(),
            PayloadFile::Changes(_) => Vec::new(),
        }
    }
}
