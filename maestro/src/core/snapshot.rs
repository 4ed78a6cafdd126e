//! The persisted orchestration snapshot and its field-by-field recovery.
//!
//! A snapshot is never rejected for missing or damaged optional fields.
//! [`recover_snapshot`] salvages every field independently (list fields
//! element by element) and records a note for each repair. The only fatal
//! condition is an orchestrator record that stays unusable after one rebuild
//! from the template: the rebuilt record's id is already held by a specialist
//! on the recovered roster.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::roles::SpecialistRole;
use super::types::{FileOpResult, Phase, ProjectStatus};

pub const MAX_COMPLETED_TASKS: usize = 10;
pub const MAX_FILE_VERIFICATIONS: usize = 10;

pub const ORCHESTRATOR_ID: &str = "orchestrator";
pub const ORCHESTRATOR_ROLE: &str = "Orchestrator";
const RECOVERED_PROJECT_NAME: &str = "Recovered project";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub phase: Phase,
    pub project: Project,
    pub orchestrator: OrchestratorRecord,
    pub specialists: Vec<Specialist>,
    pub event_log: Vec<EventEntry>,
    pub last_console_output: Option<String>,
    pub last_directory_listing: Option<String>,
    pub last_file_read_content: Option<String>,
    pub last_specialist_event: Option<SpecialistEvent>,
    pub workspace_structure: Option<String>,
    pub file_verifications: Vec<FileVerification>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub goal: String,
    pub status: ProjectStatus,
    pub bugs: Vec<Bug>,
    pub completed_tasks: Vec<String>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: String::new(),
            goal: String::new(),
            status: ProjectStatus::NotStarted,
            bugs: Vec::new(),
            completed_tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorRecord {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub current_focus: Option<String>,
}

impl OrchestratorRecord {
    pub fn template() -> Self {
        Self {
            id: ORCHESTRATOR_ID.to_string(),
            role: ORCHESTRATOR_ROLE.to_string(),
            current_focus: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.role.trim().is_empty()
    }
}

/// A role-scoped worker. `task_description == None` means idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialist {
    pub id: String,
    pub role: SpecialistRole,
    pub capabilities: Vec<String>,
    pub task_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Specialist {
    pub fn is_idle(&self) -> bool {
        self.task_description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub actor: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistOutcome {
    Completed,
    Blocked,
    InProgress,
    Failed,
}

impl SpecialistOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SpecialistOutcome::Completed => "completed",
            SpecialistOutcome::Blocked => "blocked",
            SpecialistOutcome::InProgress => "in progress",
            SpecialistOutcome::Failed => "failed",
        }
    }
}

/// The most recent specialist turn, as reported to the next orchestrator cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistEvent {
    pub specialist_id: String,
    pub role: String,
    pub outcome: SpecialistOutcome,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVerification {
    pub agent_id: String,
    pub task: String,
    pub results: Vec<FileOpResult>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bug {
    pub id: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub reported_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            phase: Phase::AwaitingGoal,
            project: Project::default(),
            orchestrator: OrchestratorRecord::template(),
            specialists: Vec::new(),
            event_log: Vec::new(),
            last_console_output: None,
            last_directory_listing: None,
            last_file_read_content: None,
            last_specialist_event: None,
            workspace_structure: None,
            file_verifications: Vec::new(),
        }
    }
}

impl Snapshot {
    pub fn record_event(
        &mut self,
        actor: impl Into<String>,
        event: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.event_log.push(EventEntry {
            actor: actor.into(),
            event: event.into(),
            timestamp: now,
        });
    }

    /// Keep only the newest `window` entries.
    pub fn truncate_event_log(&mut self, window: usize) {
        if self.event_log.len() > window {
            let excess = self.event_log.len() - window;
            self.event_log.drain(..excess);
        }
    }

    /// Drop single-slot observations once they have been shown to the orchestrator.
    pub fn clear_observations(&mut self) {
        self.last_console_output = None;
        self.last_directory_listing = None;
        self.last_file_read_content = None;
    }

    pub fn push_completed_task(&mut self, task: impl Into<String>) {
        push_bounded(
            &mut self.project.completed_tasks,
            task.into(),
            MAX_COMPLETED_TASKS,
        );
    }

    pub fn push_file_verification(&mut self, verification: FileVerification) {
        push_bounded(
            &mut self.file_verifications,
            verification,
            MAX_FILE_VERIFICATIONS,
        );
    }

    pub fn specialist(&self, id: &str) -> Option<&Specialist> {
        self.specialists.iter().find(|s| s.id == id)
    }
}

/// Append `item`, evicting the oldest entries beyond `cap`.
pub fn push_bounded<T>(items: &mut Vec<T>, item: T, cap: usize) {
    items.push(item);
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

/// A recovered snapshot plus a note for every repaired field.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub snapshot: Snapshot,
    pub notes: Vec<String>,
}

/// Rebuild a snapshot from arbitrary JSON, defaulting field by field.
pub fn recover_snapshot(value: Value) -> Result<Recovered> {
    let mut notes = Vec::new();
    let Value::Object(mut doc) = value else {
        notes.push("snapshot is not a JSON object; starting fresh".to_string());
        return Ok(Recovered {
            snapshot: Snapshot::default(),
            notes,
        });
    };

    let mut phase = match doc.remove("phase") {
        Some(Value::String(label)) => Phase::from(label),
        Some(_) => {
            notes.push("phase was not a string; reset to AWAITING_GOAL".to_string());
            Phase::AwaitingGoal
        }
        None => {
            notes.push("phase missing; reset to AWAITING_GOAL".to_string());
            Phase::AwaitingGoal
        }
    };

    let project = match doc.remove("project") {
        Some(Value::Object(fields)) => recover_project(fields, &mut notes),
        _ => {
            notes.push("project missing; synthesized placeholder and forced Planning".to_string());
            phase = Phase::Planning;
            Project {
                name: RECOVERED_PROJECT_NAME.to_string(),
                status: ProjectStatus::InProgress,
                ..Project::default()
            }
        }
    };


    let mut specialists: Vec<Specialist> = recover_list(&mut doc, "specialists", &mut notes);
    let before = specialists.len();
    let mut seen = std::collections::HashSet::new();
    specialists.retain(|s| seen.insert(s.id.clone()));
    if specialists.len() != before {
        notes.push(format!(
            "dropped {} specialist(s) with duplicate ids",
            before - specialists.len()
        ));
    }

    let orchestrator =
        recover_orchestrator(doc.remove("orchestrator"), &specialists, &mut notes)?;

    let event_log = recover_list(&mut doc, "eventLog", &mut notes);
    let mut file_verifications: Vec<FileVerification> =
        recover_list(&mut doc, "fileVerifications", &mut notes);
    trim_front(&mut file_verifications, MAX_FILE_VERIFICATIONS);

    let last_specialist_event = match doc.remove("lastSpecialistEvent") {
        None | Some(Value::Null) => None,
        Some(raw) => match serde_json::from_value(raw) {
            Ok(event) => Some(event),
            Err(err) => {
                notes.push(format!("dropped invalid lastSpecialistEvent: {err}"));
                None
            }
        },
    };

    Ok(Recovered {
        snapshot: Snapshot {
            phase,
            project,
            orchestrator,
            specialists,
            event_log,
            last_console_output: recover_text(&mut doc, "lastConsoleOutput"),
            last_directory_listing: recover_text(&mut doc, "lastDirectoryListing"),
            last_file_read_content: recover_text(&mut doc, "lastFileReadContent"),
            last_specialist_event,
            workspace_structure: recover_text(&mut doc, "workspaceStructure"),
            file_verifications,
        },
        notes,
    })
}

fn recover_project(mut fields: Map<String, Value>, notes: &mut Vec<String>) -> Project {
    let status = match fields.remove("status") {
        Some(Value::String(label)) => ProjectStatus::from(label),
        _ => {
            notes.push("project.status missing; reset to Not Started".to_string());
            ProjectStatus::NotStarted
        }
    };
    let mut completed_tasks: Vec<String> =
        recover_list(&mut fields, "completedTasks", notes);
    trim_front(&mut completed_tasks, MAX_COMPLETED_TASKS);
    Project {
        name: recover_text(&mut fields, "name").unwrap_or_default(),
        goal: recover_text(&mut fields, "goal").unwrap_or_default(),
        status,
        bugs: recover_list(&mut fields, "bugs", notes),
        completed_tasks,
    }
}

fn recover_orchestrator(
    raw: Option<Value>,
    roster: &[Specialist],
    notes: &mut Vec<String>,
) -> Result<OrchestratorRecord> {
    let usable = |record: &OrchestratorRecord| {
        record.is_valid() && roster.iter().all(|specialist| specialist.id != record.id)
    };
    if let Some(raw) = raw.clone()
        && let Ok(record) = serde_json::from_value::<OrchestratorRecord>(raw)
        && usable(&record)
    {
        return Ok(record);
    }

    notes.push("orchestrator record missing or invalid; rebuilt from template".to_string());
    let mut rebuilt = OrchestratorRecord::template();
    if let Some(Value::Object(fields)) = raw
        && let Some(Value::String(focus)) = fields.get("currentFocus")
    {
        rebuilt.current_focus = Some(focus.clone());
    }
    if !usable(&rebuilt) {
        bail!(
            "orchestrator record could not be reconstructed: id {:?} is held by a specialist",
            rebuilt.id
        );
    }
    Ok(rebuilt)
}

fn recover_list<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &str,
    notes: &mut Vec<String>,
) -> Vec<T> {
    match fields.remove(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let total = items.len();
            let kept: Vec<T> = items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect();
            if kept.len() != total {
                notes.push(format!(
                    "dropped {} invalid entr(ies) from {key}",
                    total - kept.len()
                ));
            }
            kept
        }
        Some(_) => {
            notes.push(format!("{key} was not a list; reset to empty"));
            Vec::new()
        }
    }
}

fn recover_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(text)) => Some(text),
        _ => None,
    }
}

fn trim_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_tasks_keep_latest_ten() {
        let mut snapshot = Snapshot::default();
        for n in 1..=11 {
            snapshot.push_completed_task(format!("task {n}"));
        }
        assert_eq!(snapshot.project.completed_tasks.len(), 10);
        assert_eq!(snapshot.project.completed_tasks[0], "task 2");
        assert_eq!(snapshot.project.completed_tasks[9], "task 11");
    }

    #[test]
    fn event_log_truncates_oldest_first() {
        let mut snapshot = Snapshot::default();
        let now = Utc::now();
        for n in 0..5 {
            snapshot.record_event("system", format!("event {n}"), now);
        }
        snapshot.truncate_event_log(2);
        let events: Vec<_> = snapshot.event_log.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(events, vec!["event 3", "event 4"]);
    }

    #[test]
    fn default_snapshot_round_trips_through_recovery() {
        let snapshot = Snapshot::default();
        let value = serde_json::to_value(&snapshot).expect("serialize");
        let recovered = recover_snapshot(value).expect("recover");
        assert_eq!(recovered.snapshot, snapshot);
        assert!(recovered.notes.is_empty(), "{:?}", recovered.notes);
    }

    #[test]
    fn missing_optional_fields_are_defaulted() {
        let value = json!({
            "phase": "Design",
            "project": {"name": "demo", "goal": "build", "status": "In Progress"},
            "orchestrator": {"id": "orchestrator", "role": "Orchestrator"}
        });
        let recovered = recover_snapshot(value).expect("recover");
        assert_eq!(recovered.snapshot.phase, Phase::Design);
        assert_eq!(recovered.snapshot.project.name, "demo");
        assert!(recovered.snapshot.specialists.is_empty());
        assert!(recovered.snapshot.last_console_output.is_none());
    }

    #[test]
    fn missing_project_forces_planning() {
        let value = json!({
            "phase": "Review",
            "orchestrator": {"id": "orchestrator", "role": "Orchestrator"}
        });
        let recovered = recover_snapshot(value).expect("recover");
        assert_eq!(recovered.snapshot.phase, Phase::Planning);
        assert_eq!(recovered.snapshot.project.name, RECOVERED_PROJECT_NAME);
        assert!(!recovered.notes.is_empty());
    }

    #[test]
    fn invalid_orchestrator_is_rebuilt_from_template() {
        let value = json!({
            "phase": "Planning",
            "project": {"name": "demo", "goal": "g", "status": "In Progress"},
            "orchestrator": {"id": "", "role": 7, "currentFocus": "tests"}
        });
        let recovered = recover_snapshot(value).expect("recover");
        assert_eq!(recovered.snapshot.orchestrator.id, ORCHESTRATOR_ID);
        assert_eq!(
            recovered.snapshot.orchestrator.current_focus.as_deref(),
            Some("tests")
        );
    }

    #[test]
    fn orchestrator_id_held_by_a_specialist_is_fatal() {
        let now = Utc::now();
        let value = json!({
            "phase": "Planning",
            "project": {"name": "demo", "goal": "g", "status": "In Progress"},
            "orchestrator": {"id": "orchestrator", "role": "Orchestrator"},
            "specialists": [
                {"id": "orchestrator", "role": "Developer", "capabilities": [], "taskDescription": null, "createdAt": now}
            ]
        });
        let err = recover_snapshot(value).expect_err("collision is fatal");
        assert!(err.to_string().contains("could not be reconstructed"));
    }

    #[test]
    fn invalid_list_elements_are_dropped_individually() {
        let now = Utc::now();
        let value = json!({
            "phase": "Implementation",
            "project": {"name": "demo", "goal": "g", "status": "In Progress"},
            "orchestrator": {"id": "orchestrator", "role": "Orchestrator"},
            "specialists": [
                {"id": "dev-1", "role": "Developer", "capabilities": [], "taskDescription": null, "createdAt": now},
                {"id": "ghost", "role": "Astronaut", "capabilities": [], "taskDescription": null, "createdAt": now},
                {"id": "dev-1", "role": "Developer", "capabilities": [], "taskDescription": "dup", "createdAt": now}
            ]
        });
        let recovered = recover_snapshot(value).expect("recover");
        let ids: Vec<_> = recovered
            .snapshot
            .specialists
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["dev-1"]);
        assert_eq!(recovered.notes.len(), 2);
    }

    #[test]
    fn non_object_document_starts_fresh() {
        let recovered = recover_snapshot(json!([1, 2, 3])).expect("recover");
        assert_eq!(recovered.snapshot, Snapshot::default());
        assert_eq!(recovered.notes.len(), 1);
    }
}
