//! Scripted collaborators and a temporary project fixture for tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tempfile::TempDir;

use crate::core::snapshot::Snapshot;
use crate::io::config::{MaestroConfig, write_config};
use crate::io::event_log::{EventRecord, read_events};
use crate::io::inference::{InferRequest, Inference, inference_error};
use crate::io::init::{InitOptions, MaestroPaths, init_maestro};
use crate::io::operator::{EscalationChoice, GoalRequest, Operator};
use crate::io::shell::ShellRunner;
use crate::io::snapshot_store::{load_snapshot, write_snapshot};
use crate::session::Session;

/// Inference backend replaying canned responses in call order.
///
/// Once the script is exhausted every call fails with the error prefix.
#[derive(Debug, Default)]
pub struct ScriptedInference {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<InferRequest>>,
}

impl ScriptedInference {
    pub fn new<T: Into<String>>(responses: impl IntoIterator<Item = T>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<InferRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("responses lock").len()
    }
}

impl Inference for ScriptedInference {
    async fn infer(&self, request: &InferRequest) -> String {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| inference_error("script exhausted"))
    }
}

/// Shell runner returning canned output and recording commands.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    outputs: Mutex<VecDeque<String>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub fn new<T: Into<String>>(outputs: impl IntoIterator<Item = T>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(Into::into).collect()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands lock").clone()
    }
}

impl ShellRunner for ScriptedShell {
    async fn run(&self, command: &str) -> String {
        self.commands
            .lock()
            .expect("commands lock")
            .push(command.to_string());
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .unwrap_or_else(|| "[exit status 0]".to_string())
    }
}

/// Operator answering goal prompts and escalations from queues.
///
/// An exhausted goal queue means "exit"; an exhausted choice queue means
/// "continue waiting".
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    goals: Mutex<VecDeque<Option<String>>>,
    choices: Mutex<VecDeque<EscalationChoice>>,
    goal_requests: Mutex<Vec<GoalRequest>>,
    escalations: Mutex<Vec<u32>>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_goals<T: Into<String>>(self, goals: impl IntoIterator<Item = Option<T>>) -> Self {
        *self.goals.lock().expect("goals lock") =
            goals.into_iter().map(|goal| goal.map(Into::into)).collect();
        self
    }

    pub fn with_choices(self, choices: impl IntoIterator<Item = EscalationChoice>) -> Self {
        *self.choices.lock().expect("choices lock") = choices.into_iter().collect();
        self
    }

    pub fn goal_requests(&self) -> Vec<GoalRequest> {
        self.goal_requests.lock().expect("goal requests lock").clone()
    }

    /// Consecutive-WAIT counts passed to each escalation.
    pub fn escalations(&self) -> Vec<u32> {
        self.escalations.lock().expect("escalations lock").clone()
    }
}

impl Operator for ScriptedOperator {
    fn request_goal(&self, request: GoalRequest) -> Result<Option<String>> {
        self.goal_requests
            .lock()
            .expect("goal requests lock")
            .push(request);
        Ok(self
            .goals
            .lock()
            .expect("goals lock")
            .pop_front()
            .flatten())
    }

    fn escalate(&self, consecutive_waits: u32) -> Result<EscalationChoice> {
        self.escalations
            .lock()
            .expect("escalations lock")
            .push(consecutive_waits);
        Ok(self
            .choices
            .lock()
            .expect("choices lock")
            .pop_front()
            .unwrap_or(EscalationChoice::ContinueWaiting))
    }
}

/// Initialized project in a temporary directory.
pub struct TestProject {
    dir: TempDir,
    paths: MaestroPaths,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let paths = init_maestro(dir.path(), &InitOptions { force: false })?;
        Ok(Self { dir, paths })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> &MaestroPaths {
        &self.paths
    }

    pub fn workspace(&self) -> PathBuf {
        self.config()
            .map(|config| config.workspace_root(self.root()))
            .unwrap_or_else(|_| self.root().join("workspace"))
    }

    pub fn config(&self) -> Result<MaestroConfig> {
        crate::io::config::load_config(&self.paths.config_path)
    }

    pub fn write_config(&self, config: &MaestroConfig) -> Result<()> {
        write_config(&self.paths.config_path, config)
    }

    /// Open a session; must run inside a tokio runtime.
    pub fn session<I: Inference, S: ShellRunner, O: Operator>(
        &self,
        inference: I,
        shell: S,
        operator: O,
    ) -> Result<Session<I, S, O>> {
        Session::open(self.root(), inference, shell, operator)
    }

    pub fn read_snapshot(&self) -> Result<Snapshot> {
        Ok(load_snapshot(&self.paths)?.snapshot)
    }

    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        write_snapshot(&self.paths.snapshot_path, snapshot)
    }

    pub fn events(&self) -> Result<Vec<EventRecord>> {
        read_events(&self.paths.events_path)
    }
}
