//! Bug bookkeeping driven by specialist `REPORT_BUG` / `FIX_BUG` / `VERIFY_BUG` actions.

use chrono::{DateTime, Utc};

use super::actions::BugAction;
use super::snapshot::{Bug, Project};

pub const STATUS_OPEN: &str = "Open";
pub const STATUS_FIXED: &str = "Fixed";
pub const STATUS_VERIFIED: &str = "Verified";
const DEFAULT_SEVERITY: &str = "medium";

/// Summary of one batch of bug actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BugBatch {
    pub opened: Vec<String>,
    pub updated: Vec<String>,
    /// Ids referenced by FIX/VERIFY that do not exist.
    pub unknown: Vec<String>,
}

impl BugBatch {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.updated.is_empty() && self.unknown.is_empty()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.opened.is_empty() {
            parts.push(format!("opened {}", self.opened.join(", ")));
        }
        if !self.updated.is_empty() {
            parts.push(format!("updated {}", self.updated.join(", ")));
        }
        if !self.unknown.is_empty() {
            parts.push(format!("unknown {}", self.unknown.join(", ")));
        }
        parts.join("; ")
    }
}

pub fn apply_bug_actions(
    project: &mut Project,
    actions: &[BugAction],
    reporter: &str,
    now: DateTime<Utc>,
) -> BugBatch {
    let mut batch = BugBatch::default();
    for action in actions {
        match action {
            BugAction::Report {
                description,
                severity,
            } => {
                let id = next_bug_id(&project.bugs);
                project.bugs.push(Bug {
                    id: id.clone(),
                    description: description.clone(),
                    severity: severity
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SEVERITY.to_string()),
                    status: STATUS_OPEN.to_string(),
                    reported_by: reporter.to_string(),
                    created_at: now,
                    updated_at: now,
                    notes: Vec::new(),
                });
                batch.opened.push(id);
            }
            BugAction::Fix { id, notes } => {
                update_bug(project, id, STATUS_FIXED, notes.as_deref(), now, &mut batch);
            }
            BugAction::Verify { id, status, notes } => {
                let status = status.as_deref().unwrap_or(STATUS_VERIFIED);
                update_bug(project, id, status, notes.as_deref(), now, &mut batch);
            }
        }
    }
    batch
}

fn update_bug(
    project: &mut Project,
    id: &str,
    status: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
    batch: &mut BugBatch,
) {
    let Some(bug) = project
        .bugs
        .iter_mut()
        .find(|bug| bug.id.eq_ignore_ascii_case(id.trim()))
    else {
        batch.unknown.push(id.to_string());
        return;
    };
    bug.status = status.to_string();
    bug.updated_at = now;
    if let Some(note) = notes {
        bug.notes.push(note.to_string());
    }
    batch.updated.push(bug.id.clone());
}

fn next_bug_id(bugs: &[Bug]) -> String {
    let highest = bugs
        .iter()
        .filter_map(|bug| bug.id.strip_prefix("BUG-"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("BUG-{}", highest + 1)
}

/// Bugs that are neither fixed nor verified.
pub fn open_bugs(project: &Project) -> impl Iterator<Item = &Bug> {
    project
        .bugs
        .iter()
        .filter(|bug| bug.status != STATUS_FIXED && bug.status != STATUS_VERIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_fix_verify_lifecycle() {
        let mut project = Project::default();
        let now = Utc::now();
        let batch = apply_bug_actions(
            &mut project,
            &[BugAction::Report {
                description: "crash on empty input".to_string(),
                severity: Some("high".to_string()),
            }],
            "tester-t-1",
            now,
        );
        assert_eq!(batch.opened, vec!["BUG-1"]);
        assert_eq!(open_bugs(&project).count(), 1);

        apply_bug_actions(
            &mut project,
            &[BugAction::Fix {
                id: "BUG-1".to_string(),
                notes: Some("guarded empty input".to_string()),
            }],
            "developer-t-1",
            now,
        );
        assert_eq!(project.bugs[0].status, STATUS_FIXED);

        apply_bug_actions(
            &mut project,
            &[BugAction::Verify {
                id: "bug-1".to_string(),
                status: None,
                notes: None,
            }],
            "tester-t-1",
            now,
        );
        assert_eq!(project.bugs[0].status, STATUS_VERIFIED);
        assert_eq!(project.bugs[0].notes, vec!["guarded empty input"]);
        assert_eq!(open_bugs(&project).count(), 0);
    }

    #[test]
    fn unknown_ids_are_reported_not_created() {
        let mut project = Project::default();
        let batch = apply_bug_actions(
            &mut project,
            &[BugAction::Fix {
                id: "BUG-9".to_string(),
                notes: None,
            }],
            "developer-t-1",
            Utc::now(),
        );
        assert_eq!(batch.unknown, vec!["BUG-9"]);
        assert!(project.bugs.is_empty());
    }

    #[test]
    fn ids_continue_after_highest_existing() {
        let mut project = Project::default();
        let report = BugAction::Report {
            description: "x".to_string(),
            severity: None,
        };
        apply_bug_actions(&mut project, &[report.clone(), report.clone()], "r", Utc::now());
        project.bugs.remove(0);
        let batch = apply_bug_actions(&mut project, &[report], "r", Utc::now());
        assert_eq!(batch.opened, vec!["BUG-3"]);
    }
}
