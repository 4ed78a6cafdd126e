//! Atomic file replacement shared by the config and snapshot stores.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Write `contents` to a sibling temp file, then rename it over `path`.
///
/// The containing directory is fsynced afterwards on a best-effort basis so
/// the rename itself survives a crash.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;

    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);

    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    sync_dir(parent);
    Ok(())
}

fn sync_dir(dir: &Path) {
    match fs::File::open(dir).and_then(|handle| handle.sync_all()) {
        Ok(()) => {}
        Err(err) => debug!(dir = %dir.display(), err = %err, "directory fsync skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file_without_leaving_temp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("state.json");
        write_atomic(&path, "one").expect("first write");
        write_atomic(&path, "two").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert!(!temp.path().join("nested").join("state.json.tmp").exists());
    }
}
