//! Typed actions extracted from a directive.
//!
//! Every field of [`ActionBundle`] is independently optional; absence is the
//! only way the parser signals that a directive did not contain an action.

use serde::Serialize;

/// Phase/status control emitted by the orchestrator.
///
/// Phase and status names are kept verbatim; resolution against the known set
/// happens when the action is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemAction {
    ChangePhase { phase: String },
    ChangeStatus { status: String },
    Wait { reason: Option<String> },
    RequestUserInput { prompt: Option<String> },
}

impl SystemAction {
    pub fn kind(&self) -> &'static str {
        match self {
            SystemAction::ChangePhase { .. } => "CHANGE_PHASE",
            SystemAction::ChangeStatus { .. } => "CHANGE_STATUS",
            SystemAction::Wait { .. } => "WAIT",
            SystemAction::RequestUserInput { .. } => "REQUEST_USER_INPUT",
        }
    }

    pub fn is_wait(&self) -> bool {
        matches!(self, SystemAction::Wait { .. })
    }
}

/// `LIST_DIRECTORY` / `READ_FILE` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathAction {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegateTaskAction {
    pub role: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAction {
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileActionKind {
    CreateFile,
    ModifyFile,
    CreateDirectory,
}

impl FileActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileActionKind::CreateFile => "CREATE_FILE",
            FileActionKind::ModifyFile => "MODIFY_FILE",
            FileActionKind::CreateDirectory => "CREATE_DIRECTORY",
        }
    }
}

/// A file mutation with its associated fenced-block payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAction {
    pub kind: FileActionKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BugAction {
    #[serde(rename = "REPORT_BUG")]
    Report {
        description: String,
        severity: Option<String>,
    },
    #[serde(rename = "VERIFY_BUG")]
    Verify {
        id: String,
        status: Option<String>,
        notes: Option<String>,
    },
    #[serde(rename = "FIX_BUG")]
    Fix { id: String, notes: Option<String> },
}

/// Specialist self-report against its assigned task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Complete,
    Blocked { reason: String },
}

/// Structured result of parsing one directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBundle {
    pub system_action: Option<SystemAction>,
    pub list_directory_action: Option<PathAction>,
    pub read_file_action: Option<PathAction>,
    pub delegate_task_action: Option<DelegateTaskAction>,
    pub command_action: Option<CommandAction>,
    pub file_actions: Vec<FileAction>,
    pub bug_actions: Vec<BugAction>,
    pub task_status: Option<TaskStatus>,
}

impl ActionBundle {
    pub fn is_empty(&self) -> bool {
        *self == ActionBundle::default()
    }
}
