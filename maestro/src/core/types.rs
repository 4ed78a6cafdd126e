//! Shared deterministic types for orchestration core logic.
//!
//! Phase and project status are closed enumerations with an explicit
//! `Unrecognized` escape hatch: loading a snapshot that carries an unknown
//! label never fails, but nothing in the core can *transition into* an
//! unrecognized value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// System-wide lifecycle label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    AwaitingGoal,
    Planning,
    Design,
    Implementation,
    Testing,
    Review,
    AwaitingNextGoal,
    /// Label found in persisted state that no longer maps to a known phase.
    Unrecognized(String),
}

impl Phase {
    pub const KNOWN: [Phase; 7] = [
        Phase::AwaitingGoal,
        Phase::Planning,
        Phase::Design,
        Phase::Implementation,
        Phase::Testing,
        Phase::Review,
        Phase::AwaitingNextGoal,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Phase::AwaitingGoal => "AWAITING_GOAL",
            Phase::Planning => "Planning",
            Phase::Design => "Design",
            Phase::Implementation => "Implementation",
            Phase::Testing => "Testing",
            Phase::Review => "Review",
            Phase::AwaitingNextGoal => "AWAITING_NEXT_GOAL",
            Phase::Unrecognized(label) => label,
        }
    }

    /// Resolve a phase name case-insensitively, ignoring spaces, `_` and `-`.
    pub fn lookup(name: &str) -> Option<Phase> {
        let wanted = normalize_label(name);
        Self::KNOWN
            .iter()
            .find(|phase| normalize_label(phase.as_str()) == wanted)
            .cloned()
    }

    /// Phases in which the loop waits for the operator to supply a goal.
    pub fn awaits_goal(&self) -> bool {
        matches!(self, Phase::AwaitingGoal | Phase::AwaitingNextGoal)
    }
}

impl From<String> for Phase {
    fn from(label: String) -> Self {
        Phase::lookup(&label).unwrap_or(Phase::Unrecognized(label))
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.as_str().to_string()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project-level status, tracked separately from [`Phase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProjectStatus {
    NotStarted,
    InProgress,
    Blocked,
    Testing,
    Completed,
    Unrecognized(String),
}

impl ProjectStatus {
    pub const KNOWN: [ProjectStatus; 5] = [
        ProjectStatus::NotStarted,
        ProjectStatus::InProgress,
        ProjectStatus::Blocked,
        ProjectStatus::Testing,
        ProjectStatus::Completed,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ProjectStatus::NotStarted => "Not Started",
            ProjectStatus::InProgress => "In Progress",
            ProjectStatus::Blocked => "Blocked",
            ProjectStatus::Testing => "Testing",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Unrecognized(label) => label,
        }
    }

    pub fn lookup(name: &str) -> Option<ProjectStatus> {
        let wanted = normalize_label(name);
        Self::KNOWN
            .iter()
            .find(|status| normalize_label(status.as_str()) == wanted)
            .cloned()
    }
}

impl From<String> for ProjectStatus {
    fn from(label: String) -> Self {
        ProjectStatus::lookup(&label).unwrap_or(ProjectStatus::Unrecognized(label))
    }
}

impl From<ProjectStatus> for String {
    fn from(status: ProjectStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Outcome of one applied file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOpResult {
    pub success: bool,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOpResult {
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            success: true,
            path: path.into(),
            error: None,
        }
    }

    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: path.into(),
            error: Some(error.into()),
        }
    }
}
