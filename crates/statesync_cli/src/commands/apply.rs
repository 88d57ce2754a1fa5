//! Apply command implementation.

use super::PayloadFile;
use statesync_protocol::ClientModel;
use std::path::PathBuf;
use tracing::{debug, info};

/// Result of replaying payload files.
#[derive(Debug)]
pub struct ApplyResult {
    /// The client model after every file was applied.
    pub client: ClientModel,
    /// Payloads applied.
    pub applied: usize,
    /// Payloads skipped because their sync id was already seen.
    pub skipped: usize,
}

/// Runs the apply command.
pub fn run(files: &[PathBuf], strict: bool) -> Result<(), Box<dyn std::error::Error>> {
    let result = replay(files, strict)?;
    info!(
        applied = result.applied,
        skipped = result.skipped,
        nodes = result.client.node_count(),
        "replayed payloads"
    );
    println!("{}", serde_json::to_string_pretty(&result.client.render())?);
    Ok(())
}

/// Replays `files` in order into a fresh client model.
pub fn replay(files: &[PathBuf], strict: bool) -> Result<ApplyResult, Box<dyn std::error::Error>> {
    let mut result = ApplyResult {
        client: if strict {
            ClientModel::strict()
        } else {
            ClientModel::new()
        },
        applied: 0,
        skipped: 0,
    };

    for path in files {
        debug!(path = %path.display(), "applying payload file");
        match PayloadFile::read(path)? {
            PayloadFile::One(payload) => {
                let outcome = result.client.apply_payload(&payload);
                result.count(outcome, path)?;
            }
            PayloadFile::Many(payloads) => {
                for payload in &payloads {
                    let outcome = result.client.apply_payload(payload);
                    result.count(outcome, path)?;
                }
            }
            PayloadFile::Changes(changes) => {
                result
                    .client
                    .apply(&changes)
                    .map_err(|e| format!("{}: {}", path.display(), e))?;
                result.applied += 1;
            }
        }
    }
    Ok(result)
}

impl ApplyResult {
    fn count(
        &mut self,
        outcome: statesync_protocol::ProtocolResult<bool>,
        path: &std::path::Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match outcome {
            Ok(true) => self.applied += 1,
            Ok(false) => self.skipped += 1,
            Err(e) => return Err(format!("{}: {}", path.display(), e).into()),
        }
        Ok(())
    }
}
