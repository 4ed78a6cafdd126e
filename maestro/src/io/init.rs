//! Initialization helpers for `.maestro/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{MaestroConfig, load_config, write_config};
use super::snapshot_store::write_snapshot;
use crate::core::snapshot::Snapshot;

/// All canonical paths within `.maestro/` for a project root.
#[derive(Debug, Clone)]
pub struct MaestroPaths {
    pub root: PathBuf,
    pub maestro_dir: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub corrupt_snapshot_path: PathBuf,
    pub events_path: PathBuf,
}

impl MaestroPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let maestro_dir = root.join(".maestro");
        let state_dir = maestro_dir.join("state");
        Self {
            root: root.clone(),
            maestro_dir: maestro_dir.clone(),
            state_dir: state_dir.clone(),
            gitignore_path: maestro_dir.join(".gitignore"),
            config_path: maestro_dir.join("config.toml"),
            snapshot_path: state_dir.join("snapshot.json"),
            corrupt_snapshot_path: state_dir.join("snapshot.corrupt.json"),
            events_path: maestro_dir.join("events.jsonl"),
        }
    }
}

/// Options for `init_maestro`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing maestro-owned files.
    pub force: bool,
}

/// Create `.maestro/` scaffolding and the workspace directory in `root`.
///
/// Fails if `.maestro/` already exists unless `options.force` is set. A forced
/// init resets the config, the snapshot and the event log; the workspace
/// contents are left alone.
pub fn init_maestro(root: &Path, options: &InitOptions) -> Result<MaestroPaths> {
    let paths = MaestroPaths::new(root);
    if paths.maestro_dir.exists() && !paths.maestro_dir.is_dir() {
        return Err(anyhow!(
            "maestro init: .maestro exists but is not a directory"
        ));
    }
    if paths.maestro_dir.exists() && !options.force {
        return Err(anyhow!(
            "maestro init: .maestro already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.state_dir)?;
    write_file(&paths.gitignore_path, MAESTRO_GITIGNORE)?;
    let config = MaestroConfig::default();
    write_config(&paths.config_path, &config)?;
    write_snapshot(&paths.snapshot_path, &Snapshot::default())?;
    write_file(&paths.events_path, "")?;
    create_dir(&config.workspace_root(root))?;
    Ok(paths)
}

/// Make sure the scaffolding `maestro run` needs exists, without touching
/// anything already present.
pub fn ensure_layout(root: &Path) -> Result<MaestroPaths> {
    let paths = MaestroPaths::new(root);
    if !paths.maestro_dir.exists() {
        return init_maestro(root, &InitOptions { force: false });
    }
    create_dir(&paths.state_dir)?;
    let config = load_config(&paths.config_path)?;
    create_dir(&config.workspace_root(root))?;
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const MAESTRO_GITIGNORE: &str = "state/\nevents.jsonl\n";
