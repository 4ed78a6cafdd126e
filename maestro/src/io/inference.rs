//! Text-generation backend abstraction.
//!
//! The [`Inference`] trait decouples the loop from the backend (by default a
//! command such as `codex exec`). Failures are not errors: they come back as
//! text carrying [`INFERENCE_ERROR_PREFIX`], which the loop treats as a
//! directive with no actions. Tests use scripted backends.

use std::future::Future;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use super::config::InferenceConfig;
use super::process::run_with_timeout;

/// Reserved prefix marking a failed inference.
pub const INFERENCE_ERROR_PREFIX: &str = "[INFERENCE_ERROR]";

#[derive(Debug, Clone)]
pub struct InferRequest {
    /// Id of the agent the prompt is for (`orchestrator`, `developer-...`).
    pub actor: String,
    pub prompt: String,
}

pub trait Inference {
    fn infer(&self, request: &InferRequest) -> impl Future<Output = String>;
}

pub fn inference_error(message: impl AsRef<str>) -> String {
    format!("{INFERENCE_ERROR_PREFIX} {}", message.as_ref())
}

pub fn is_inference_error(text: &str) -> bool {
    text.trim_start().starts_with(INFERENCE_ERROR_PREFIX)
}

/// Backend that pipes the prompt into a configured command and returns stdout.
///
/// `timeout` is the adapter's own process ceiling; the loop never cancels an
/// inference call.
#[derive(Debug, Clone)]
pub struct CommandInference {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandInference {
    pub fn new(config: &InferenceConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: config.command.clone(),
            workdir: workdir.into(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn run_blocking(&self, prompt: &str) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("inference command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);

        let output = run_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )?;
        if output.timed_out {
            return Err(anyhow!(
                "{program} timed out after {}s",
                self.timeout.as_secs()
            ));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{program} exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        Ok(output.stdout_text())
    }
}

impl Inference for CommandInference {
    #[instrument(skip_all, fields(actor = %request.actor, prompt_bytes = request.prompt.len()))]
    async fn infer(&self, request: &InferRequest) -> String {
        info!("requesting inference");
        let backend = self.clone();
        let prompt = request.prompt.clone();
        match tokio::task::spawn_blocking(move || backend.run_blocking(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(err = %format!("{err:#}"), "inference backend failed");
                inference_error(format!("{err:#}"))
            }
            Err(err) => inference_error(format!("inference task failed: {err}")),
        }
    }
}
