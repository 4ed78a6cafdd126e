//! Lexical workspace path rules.
//!
//! Every path an agent names is workspace-relative. Rejections are uniform:
//! the caller only ever learns "invalid path". Symlink escapes are checked
//! separately by the file store, which can see the filesystem.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

const WORKSPACE_PREFIX: &str = "/workspace";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path")]
pub struct InvalidPath;

/// Normalize an agent-supplied path to a workspace-relative path.
///
/// A leading `/workspace/` is stripped. `.` (or an empty result after
/// stripping `/workspace`) designates the workspace root and yields an empty
/// path.
pub fn normalize_workspace_path(raw: &str) -> Result<PathBuf, InvalidPath> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains('\0') {
        return Err(InvalidPath);
    }

    let relative = match trimmed.strip_prefix(WORKSPACE_PREFIX) {
        Some("") => ".",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => trimmed,
    };
    let relative = if relative.is_empty() { "." } else { relative };
    if relative.starts_with('\\') {
        return Err(InvalidPath);
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(InvalidPath);
            }
        }
    }
    Ok(normalized)
}

/// Render a normalized path for results and logs.
pub fn display_path(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.to_string_lossy().replace('\\', "/")
    }
}
