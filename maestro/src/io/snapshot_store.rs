//! Snapshot persistence (`.maestro/state/snapshot.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use super::atomic::write_atomic;
use super::init::MaestroPaths;
use crate::core::snapshot::{Recovered, Snapshot, recover_snapshot};

/// Load the snapshot, defaulting field by field.
///
/// A missing file yields a fresh snapshot. Text that is not JSON at all is
/// preserved as `snapshot.corrupt.json` before starting fresh. Only an
/// unrecoverable orchestrator record is an error.
pub fn load_snapshot(paths: &MaestroPaths) -> Result<Recovered> {
    let path = &paths.snapshot_path;
    if !path.exists() {
        debug!(path = %path.display(), "no snapshot yet; starting fresh");
        return Ok(Recovered {
            snapshot: Snapshot::default(),
            notes: Vec::new(),
        });
    }

    let raw = fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "snapshot is not valid JSON; preserving copy");
            fs::write(&paths.corrupt_snapshot_path, &raw).with_context(|| {
                format!("preserve corrupt snapshot {}", paths.corrupt_snapshot_path.display())
            })?;
            return Ok(Recovered {
                snapshot: Snapshot::default(),
                notes: vec![format!(
                    "snapshot unparseable ({err}); preserved at {} and started fresh",
                    paths.corrupt_snapshot_path.display()
                )],
            });
        }
    };

    let recovered = recover_snapshot(value)
        .with_context(|| format!("recover snapshot {}", path.display()))?;
    if !recovered.notes.is_empty() {
        warn!(notes = recovered.notes.len(), "snapshot repaired on load");
    }
    Ok(recovered)
}

/// Atomically write the snapshot (temp file + rename + directory fsync).
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    debug!(path = %path.display(), phase = %snapshot.phase, "writing snapshot");
    let mut buf = serde_json::to_string_pretty(snapshot).context("serialize snapshot")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
