//! Maestro configuration stored under `.maestro/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Maestro configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values in
/// [`MaestroConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MaestroConfig {
    /// Sandbox root for all agent file operations, relative to the project root.
    pub workspace_dir: String,

    /// Consecutive WAIT directives before the operator is asked to intervene.
    pub stagnation_threshold: u32,

    /// Number of events kept in the snapshot's event log.
    pub event_window: usize,

    /// Number of recent events rendered into the orchestrator prompt.
    pub history_in_prompt: usize,

    /// Characters of the orchestrator directive shown to a specialist.
    pub directive_preview_chars: usize,

    /// Prompt size budget; droppable sections are removed first.
    pub prompt_budget_bytes: usize,

    /// Cap for `READ_FILE` observations.
    pub file_read_limit_bytes: usize,

    /// Maximum entries in the workspace structure summary.
    pub workspace_summary_entries: usize,

    /// How long a checkpoint waits for queued file operations.
    pub drain_timeout_ms: u64,

    /// Cycle cap for one `maestro run` (0 = unlimited).
    pub max_cycles: u32,

    pub inference: InferenceConfig,
    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Backend command; the prompt is written to its stdin.
    pub command: Vec<String>,
    /// Process ceiling enforced by the adapter, not by the loop.
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "-".to_string(),
            ],
            timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            output_limit_bytes: 20_000,
        }
    }
}

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            workspace_dir: "workspace".to_string(),
            stagnation_threshold: 5,
            event_window: 50,
            history_in_prompt: 15,
            directive_preview_chars: 1_500,
            prompt_budget_bytes: 60_000,
            file_read_limit_bytes: 20_000,
            workspace_summary_entries: 200,
            drain_timeout_ms: 10_000,
            max_cycles: 0,
            inference: InferenceConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl MaestroConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workspace_dir.trim().is_empty() {
            return Err(anyhow!("workspace_dir must not be empty"));
        }
        if self.stagnation_threshold == 0 {
            return Err(anyhow!("stagnation_threshold must be > 0"));
        }
        if self.event_window == 0 {
            return Err(anyhow!("event_window must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.file_read_limit_bytes == 0 {
            return Err(anyhow!("file_read_limit_bytes must be > 0"));
        }
        if self.inference.command.is_empty() || self.inference.command[0].trim().is_empty() {
            return Err(anyhow!("inference.command must be a non-empty array"));
        }
        if self.inference.timeout_secs == 0 {
            return Err(anyhow!("inference.timeout_secs must be > 0"));
        }
        if self.shell.timeout_secs == 0 {
            return Err(anyhow!("shell.timeout_secs must be > 0"));
        }
        if self.shell.output_limit_bytes == 0 {
            return Err(anyhow!("shell.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn workspace_root(&self, project_root: &Path) -> std::path::PathBuf {
        project_root.join(&self.workspace_dir)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MaestroConfig::default()`.
pub fn load_config(path: &Path) -> Result<MaestroConfig> {
    if !path.exists() {
        let cfg = MaestroConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MaestroConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MaestroConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::atomic::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, MaestroConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = MaestroConfig {
            stagnation_threshold: 3,
            ..MaestroConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "stagnation_threshold = 2\n[shell]\ntimeout_secs = 5\n").expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.stagnation_threshold, 2);
        assert_eq!(loaded.shell.timeout_secs, 5);
        assert_eq!(loaded.shell.output_limit_bytes, 20_000);
        assert_eq!(loaded.workspace_dir, "workspace");
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "stagnation_threshold = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("stagnation_threshold"));
    }
}
