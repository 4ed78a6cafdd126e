//! Long-lived orchestration session: owned collaborators plus the
//! drain-then-persist checkpoint discipline.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::core::registry::IdGenerator;
use crate::core::snapshot::Snapshot;
use crate::core::stagnation::StagnationGuard;
use crate::io::config::{MaestroConfig, load_config};
use crate::io::event_log::{EventKind, EventLog, EventRecord};
use crate::io::file_queue::{DrainStatus, FileOpQueue};
use crate::io::file_store::FileStore;
use crate::io::inference::Inference;
use crate::io::init::{MaestroPaths, ensure_layout};
use crate::io::operator::Operator;
use crate::io::prompt::PromptBuilder;
use crate::io::shell::ShellRunner;
use crate::io::snapshot_store::{load_snapshot, write_snapshot};

pub struct Session<I, S, O> {
    pub paths: MaestroPaths,
    pub config: MaestroConfig,
    events: EventLog,
    files: FileStore,
    queue: FileOpQueue,
    prompts: PromptBuilder,
    inference: I,
    shell: S,
    operator: O,
    pub(crate) guard: StagnationGuard,
    pub(crate) ids: IdGenerator,
    pub(crate) cycles: u32,
}

impl<I: Inference, S: ShellRunner, O: Operator> Session<I, S, O> {
    /// Open a session rooted at `root`, creating missing scaffolding.
    ///
    /// Must be called from within a tokio runtime: the file queue worker is
    /// spawned here.
    pub fn open(root: &Path, inference: I, shell: S, operator: O) -> Result<Self> {
        let paths = ensure_layout(root)?;
        let config = load_config(&paths.config_path)
            .with_context(|| format!("load {}", paths.config_path.display()))?;
        let files = FileStore::open(&config.workspace_root(root))?;
        let queue = FileOpQueue::start(files.clone());
        Ok(Self {
            events: EventLog::new(&paths.events_path),
            prompts: PromptBuilder::new(config.prompt_budget_bytes, config.history_in_prompt),
            guard: StagnationGuard::new(config.stagnation_threshold),
            ids: IdGenerator::from_clock(Utc::now()),
            cycles: 0,
            paths,
            config,
            files,
            queue,
            inference,
            shell,
            operator,
        })
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn queue(&self) -> &FileOpQueue {
        &self.queue
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub fn inference(&self) -> &I {
        &self.inference
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn consecutive_waits(&self) -> u32 {
        self.guard.consecutive_waits()
    }

    /// Append to the product event log. Failures are downgraded to warnings.
    pub fn log(&self, record: EventRecord) {
        if let Err(err) = self.events.append(&record) {
            warn!(err = %format!("{err:#}"), kind = ?record.kind, "event log append failed");
        }
    }

    /// Wait for queued file operations, reporting a timeout instead of failing.
    pub async fn drain(&self) -> DrainStatus {
        let status = self.queue.drain(self.config.drain_timeout()).await;
        if let DrainStatus::TimedOut { pending } = status {
            self.log(
                EventRecord::new("system", EventKind::DrainTimeout, "file queue drain timed out")
                    .with_data(json!({ "pending": pending })),
            );
        }
        status
    }

    /// Drain, then load the snapshot with field-by-field recovery.
    pub async fn reload(&self) -> Result<Snapshot> {
        self.drain().await;
        let recovered = load_snapshot(&self.paths)?;
        for note in &recovered.notes {
            self.log(EventRecord::new("system", EventKind::Recovery, note.clone()));
        }
        Ok(recovered.snapshot)
    }

    /// Drain, then atomically persist `snapshot`.
    pub async fn checkpoint(&self, snapshot: &Snapshot) -> Result<()> {
        self.drain().await;
        write_snapshot(&self.paths.snapshot_path, snapshot)?;
        debug!(phase = %snapshot.phase, "checkpoint written");
        Ok(())
    }
}
