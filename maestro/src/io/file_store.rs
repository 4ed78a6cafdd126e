//! Path-sandboxed file store rooted at the workspace directory.
//!
//! Mutations are applied through [`FileStore::apply`], normally via the
//! serialized queue in `io::file_queue`. Read-only helpers back the
//! orchestrator's `LIST_DIRECTORY` / `READ_FILE` observations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::actions::{FileAction, FileActionKind};
use crate::core::sandbox::{display_path, normalize_workspace_path};
use crate::core::types::FileOpResult;

/// Coded per-operation failure; never propagated past the store as a panic
/// or an `anyhow` error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileOpError {
    #[error("INVALID_PATH: invalid path")]
    InvalidPath,
    #[error("NOT_FOUND: {0} does not exist")]
    NotFound(String),
    #[error("WRONG_TYPE: {0}")]
    WrongType(String),
    #[error("MISSING_CONTENT: MODIFY_FILE requires content")]
    MissingContent,
    #[error("IO: {0}")]
    Io(String),
    #[error("QUEUE_CLOSED: file operation queue is not running")]
    QueueClosed,
}

impl FileOpError {
    pub fn code(&self) -> &'static str {
        match self {
            FileOpError::InvalidPath => "INVALID_PATH",
            FileOpError::NotFound(_) => "NOT_FOUND",
            FileOpError::WrongType(_) => "WRONG_TYPE",
            FileOpError::MissingContent => "MISSING_CONTENT",
            FileOpError::Io(_) => "IO",
            FileOpError::QueueClosed => "QUEUE_CLOSED",
        }
    }
}

impl From<io::Error> for FileOpError {
    fn from(err: io::Error) -> Self {
        FileOpError::Io(err.to_string())
    }
}

/// A workspace path that passed both lexical and filesystem checks.
#[derive(Debug, Clone)]
struct Resolved {
    absolute: PathBuf,
    display: String,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the workspace root.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("create workspace {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("canonicalize workspace {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply one mutation and report its outcome.
    pub fn apply(&self, action: &FileAction) -> FileOpResult {
        let outcome = self.resolve(&action.path).and_then(|resolved| {
            self.apply_resolved(action, &resolved)?;
            Ok(resolved.display)
        });
        match outcome {
            Ok(shown) => {
                debug!(kind = action.kind.as_str(), path = %shown, "file operation applied");
                FileOpResult::ok(shown)
            }
            Err(err) => {
                warn!(kind = action.kind.as_str(), path = %action.path, err = %err, "file operation failed");
                FileOpResult::failed(action.path.clone(), err.to_string())
            }
        }
    }

    fn apply_resolved(&self, action: &FileAction, target: &Resolved) -> Result<(), FileOpError> {
        let path = &target.absolute;
        match action.kind {
            FileActionKind::CreateFile => {
                if path.is_dir() {
                    return Err(FileOpError::WrongType(format!(
                        "{} is a directory",
                        target.display
                    )));
                }
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, action.content.as_deref().unwrap_or_default())?;
            }
            FileActionKind::ModifyFile => {
                let content = action
                    .content
                    .as_deref()
                    .ok_or(FileOpError::MissingContent)?;
                if !path.exists() {
                    return Err(FileOpError::NotFound(target.display.clone()));
                }
                if !path.is_file() {
                    return Err(FileOpError::WrongType(format!(
                        "{} is not a file",
                        target.display
                    )));
                }
                fs::write(path, content)?;
            }
            FileActionKind::CreateDirectory => {
                if path.exists() && !path.is_dir() {
                    return Err(FileOpError::WrongType(format!(
                        "{} is a file",
                        target.display
                    )));
                }
                fs::create_dir_all(path)?;
            }
        }
        Ok(())
    }

    /// Sorted listing of one directory: directories end with `/`, files show
    /// their size.
    pub fn list_directory(&self, raw: &str) -> Result<String, FileOpError> {
        let target = self.resolve(raw)?;
        if !target.absolute.exists() {
            return Err(FileOpError::NotFound(target.display));
        }
        if !target.absolute.is_dir() {
            return Err(FileOpError::WrongType(format!(
                "{} is not a directory",
                target.display
            )));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&target.absolute)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                entries.push(format!("{name}/"));
            } else {
                entries.push(format!("{name} ({} bytes)", meta.len()));
            }
        }
        entries.sort();
        if entries.is_empty() {
            return Ok(format!("{}: (empty directory)", target.display));
        }
        Ok(format!("{}:\n{}", target.display, entries.join("\n")))
    }

    /// File contents, capped at `limit_bytes` with a trailing marker.
    pub fn read_file(&self, raw: &str, limit_bytes: usize) -> Result<String, FileOpError> {
        let target = self.resolve(raw)?;
        if !target.absolute.exists() {
            return Err(FileOpError::NotFound(target.display));
        }
        if !target.absolute.is_file() {
            return Err(FileOpError::WrongType(format!(
                "{} is not a file",
                target.display
            )));
        }
        let bytes = fs::read(&target.absolute)?;
        let total = bytes.len();
        let mut text = String::from_utf8_lossy(&bytes[..total.min(limit_bytes)]).into_owned();
        if total > limit_bytes {
            text.push_str(&format!("\n[truncated {} bytes]", total - limit_bytes));
        }
        Ok(text)
    }

    /// Indented tree of the workspace, capped at `max_entries` lines.
    pub fn summarize(&self, max_entries: usize) -> String {
        let mut lines = Vec::new();
        let mut omitted = 0usize;
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(err = %err, "skipping unreadable workspace entry");
                    continue;
                }
            };
            if lines.len() >= max_entries {
                omitted += 1;
                continue;
            }
            let indent = "  ".repeat(entry.depth() - 1);
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                lines.push(format!("{indent}{name}/"));
            } else {
                lines.push(format!("{indent}{name}"));
            }
        }
        if lines.is_empty() {
            return "(empty workspace)".to_string();
        }
        if omitted > 0 {
            lines.push(format!("... ({omitted} more entries)"));
        }
        lines.join("\n")
    }

    /// Lexical normalization followed by a symlink-aware containment check on
    /// the deepest existing ancestor.
    fn resolve(&self, raw: &str) -> Result<Resolved, FileOpError> {
        let relative = normalize_workspace_path(raw).map_err(|_| FileOpError::InvalidPath)?;
        let absolute = self.root.join(&relative);

        let mut probe = absolute.as_path();
        loop {
            if fs::symlink_metadata(probe).is_ok() {
                let canonical = probe.canonicalize().map_err(|_| FileOpError::InvalidPath)?;
                if !canonical.starts_with(&self.root) {
                    return Err(FileOpError::InvalidPath);
                }
                break;
            }
            match probe.parent() {
                Some(parent) => probe = parent,
                None => return Err(FileOpError::InvalidPath),
            }
        }

        Ok(Resolved {
            absolute,
            display: display_path(&relative),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(&temp.path().join("workspace")).expect("open");
        (temp, store)
    }

    fn action(kind: FileActionKind, path: &str, content: Option<&str>) -> FileAction {
        FileAction {
            kind,
            path: path.to_string(),
            content: content.map(str::to_string),
        }
    }

    #[test]
    fn create_file_makes_parents_and_overwrites() {
        let (_temp, store) = store();
        let first = store.apply(&action(FileActionKind::CreateFile, "src/lib.rs", Some("one")));
        assert!(first.success, "{first:?}");
        let second = store.apply(&action(FileActionKind::CreateFile, "/workspace/src/lib.rs", Some("two")));
        assert!(second.success);
        assert_eq!(second.path, "src/lib.rs");
        assert_eq!(fs::read_to_string(store.root().join("src/lib.rs")).expect("read"), "two");
    }

    #[test]
    fn modify_requires_existing_file() {
        let (_temp, store) = store();
        let result = store.apply(&action(FileActionKind::ModifyFile, "missing.txt", Some("x")));
        assert!(!result.success);
        assert!(result.error.as_deref().expect("error").starts_with("NOT_FOUND"));
        assert!(!store.root().join("missing.txt").exists());
    }

    #[test]
    fn modify_requires_content() {
        let (_temp, store) = store();
        store.apply(&action(FileActionKind::CreateFile, "a.txt", Some("x")));
        let result = store.apply(&action(FileActionKind::ModifyFile, "a.txt", None));
        assert!(result.error.as_deref().expect("error").starts_with("MISSING_CONTENT"));
    }

    #[test]
    fn create_directory_is_idempotent() {
        let (_temp, store) = store();
        assert!(store.apply(&action(FileActionKind::CreateDirectory, "a/b/c", None)).success);
        assert!(store.apply(&action(FileActionKind::CreateDirectory, "a/b/c", None)).success);
        assert!(store.root().join("a/b/c").is_dir());
    }

    #[test]
    fn escaping_paths_are_rejected_for_every_operation() {
        let (temp, store) = store();
        for raw in ["../secret", "/etc/passwd", "workspace/../../x"] {
            for kind in [
                FileActionKind::CreateFile,
                FileActionKind::ModifyFile,
                FileActionKind::CreateDirectory,
            ] {
                let result = store.apply(&action(kind, raw, Some("x")));
                assert!(!result.success, "{kind:?} {raw}");
                assert_eq!(result.error.as_deref(), Some("INVALID_PATH: invalid path"));
            }
            assert_eq!(store.list_directory(raw), Err(FileOpError::InvalidPath));
            assert_eq!(store.read_file(raw, 100), Err(FileOpError::InvalidPath));
        }
        assert!(!temp.path().join("secret").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (temp, store) = store();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).expect("mkdir");
        std::os::unix::fs::symlink(&outside, store.root().join("link")).expect("symlink");

        let result = store.apply(&action(FileActionKind::CreateFile, "link/evil.txt", Some("x")));
        assert_eq!(result.error.as_deref(), Some("INVALID_PATH: invalid path"));
        assert!(!outside.join("evil.txt").exists());
    }

    #[test]
    fn list_and_read_observe_workspace() {
        let (_temp, store) = store();
        store.apply(&action(FileActionKind::CreateFile, "src/main.rs", Some("fn main() {}")));
        store.apply(&action(FileActionKind::CreateFile, "README.md", Some("hi")));

        let listing = store.list_directory(".").expect("list");
        assert_eq!(listing, ".:\nREADME.md (2 bytes)\nsrc/");
        assert_eq!(store.read_file("src/main.rs", 100).expect("read"), "fn main() {}");
        assert_eq!(
            store.read_file("src/main.rs", 2).expect("read"),
            "fn\n[truncated 10 bytes]"
        );
        assert!(matches!(store.read_file("src", 10), Err(FileOpError::WrongType(_))));
    }

    #[test]
    fn summary_is_indented_and_capped() {
        let (_temp, store) = store();
        assert_eq!(store.summarize(10), "(empty workspace)");
        store.apply(&action(FileActionKind::CreateFile, "src/a.rs", Some("")));
        store.apply(&action(FileActionKind::CreateFile, "src/b.rs", Some("")));
        store.apply(&action(FileActionKind::CreateDirectory, ".git/objects", None));

        assert_eq!(store.summarize(10), "src/\n  a.rs\n  b.rs");
        assert_eq!(store.summarize(2), "src/\n  a.rs\n... (1 more entries)");
    }
}
