//! Phase/status state machine for the orchestrated project.

use chrono::{DateTime, Utc};

use super::actions::SystemAction;
use super::snapshot::{Project, Snapshot};
use super::types::{Phase, ProjectStatus};

const PROJECT_NAME_MAX_CHARS: usize = 60;

/// Effect of applying one system action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemOutcome {
    PhaseChanged { from: Phase, to: Phase },
    StatusChanged { from: ProjectStatus, to: ProjectStatus },
    /// The project reached `Completed` / `AWAITING_NEXT_GOAL`.
    ProjectCompleted,
    Waiting { reason: Option<String> },
    /// Transition refused; state is unchanged.
    Rejected { reason: String },
}

impl SystemOutcome {
    pub fn describe(&self) -> String {
        match self {
            SystemOutcome::PhaseChanged { from, to } => format!("phase {from} -> {to}"),
            SystemOutcome::StatusChanged { from, to } => format!("status {from} -> {to}"),
            SystemOutcome::ProjectCompleted => {
                "project completed; awaiting next goal".to_string()
            }
            SystemOutcome::Waiting { reason: Some(reason) } => format!("waiting: {reason}"),
            SystemOutcome::Waiting { reason: None } => "waiting".to_string(),
            SystemOutcome::Rejected { reason } => format!("rejected: {reason}"),
        }
    }
}

/// Start a fresh project for `goal`.
pub fn set_goal(snapshot: &mut Snapshot, goal: &str, now: DateTime<Utc>) {
    let goal = goal.trim();
    snapshot.project = Project {
        name: project_name_from_goal(goal),
        goal: goal.to_string(),
        status: ProjectStatus::InProgress,
        ..Project::default()
    };
    snapshot.phase = Phase::Planning;
    snapshot.orchestrator.current_focus = None;
    snapshot.specialists.clear();
    snapshot.clear_observations();
    snapshot.last_specialist_event = None;
    snapshot.record_event("user", format!("new goal: {goal}"), now);
}

/// Mark the project complete and park the loop until a new goal arrives.
pub fn complete_project(snapshot: &mut Snapshot) {
    snapshot.project.status = ProjectStatus::Completed;
    snapshot.phase = Phase::AwaitingNextGoal;
    snapshot.orchestrator.current_focus = None;
    snapshot.specialists.clear();
}

pub fn apply_system_action(snapshot: &mut Snapshot, action: &SystemAction) -> SystemOutcome {
    match action {
        SystemAction::ChangePhase { phase } => {
            let Some(target) = Phase::lookup(phase) else {
                return SystemOutcome::Rejected {
                    reason: format!("unknown phase {phase:?}"),
                };
            };
            match target {
                Phase::AwaitingGoal => SystemOutcome::Rejected {
                    reason: "cannot return to AWAITING_GOAL".to_string(),
                },
                Phase::AwaitingNextGoal => {
                    complete_project(snapshot);
                    SystemOutcome::ProjectCompleted
                }
                target => {
                    let from = std::mem::replace(&mut snapshot.phase, target.clone());
                    SystemOutcome::PhaseChanged { from, to: target }
                }
            }
        }
        SystemAction::ChangeStatus { status } => {
            let Some(target) = ProjectStatus::lookup(status) else {
                return SystemOutcome::Rejected {
                    reason: format!("unknown status {status:?}"),
                };
            };
            if target == ProjectStatus::Completed {
                complete_project(snapshot);
                return SystemOutcome::ProjectCompleted;
            }
            let from = std::mem::replace(&mut snapshot.project.status, target.clone());
            SystemOutcome::StatusChanged { from, to: target }
        }
        SystemAction::Wait { reason } => SystemOutcome::Waiting {
            reason: reason.clone(),
        },
        SystemAction::RequestUserInput { .. } => {
            complete_project(snapshot);
            SystemOutcome::ProjectCompleted
        }
    }
}

/// First line of the goal, shortened to a readable project name.
pub fn project_name_from_goal(goal: &str) -> String {
    let first_line = goal.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= PROJECT_NAME_MAX_CHARS {
        return first_line.to_string();
    }
    let mut name: String = first_line.chars().take(PROJECT_NAME_MAX_CHARS).collect();
    name.push_str("...");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::roles::SpecialistRole;
    use crate::core::snapshot::Specialist;

    fn in_progress() -> Snapshot {
        let mut snapshot = Snapshot::default();
        set_goal(&mut snapshot, "Build a todo app", Utc::now());
        snapshot.specialists.push(Specialist {
            id: "developer-t-1".to_string(),
            role: SpecialistRole::Developer,
            capabilities: Vec::new(),
            task_description: Some("build".to_string()),
            created_at: Utc::now(),
        });
        snapshot.orchestrator.current_focus = Some("build".to_string());
        snapshot
    }

    fn assert_completed(snapshot: &Snapshot) {
        assert_eq!(snapshot.phase, Phase::AwaitingNextGoal);
        assert_eq!(snapshot.project.status, ProjectStatus::Completed);
        assert!(snapshot.orchestrator.current_focus.is_none());
        assert!(snapshot.specialists.is_empty());
    }

    #[test]
    fn set_goal_starts_planning() {
        let snapshot = in_progress();
        assert_eq!(snapshot.phase, Phase::Planning);
        assert_eq!(snapshot.project.status, ProjectStatus::InProgress);
        assert_eq!(snapshot.project.name, "Build a todo app");
    }

    #[test]
    fn change_phase_moves_between_progress_phases() {
        let mut snapshot = in_progress();
        let outcome = apply_system_action(
            &mut snapshot,
            &SystemAction::ChangePhase {
                phase: "design".to_string(),
            },
        );
        assert_eq!(
            outcome,
            SystemOutcome::PhaseChanged {
                from: Phase::Planning,
                to: Phase::Design
            }
        );
    }

    #[test]
    fn unknown_phase_is_rejected_without_change() {
        let mut snapshot = in_progress();
        let before = snapshot.clone();
        let outcome = apply_system_action(
            &mut snapshot,
            &SystemAction::ChangePhase {
                phase: "Deployment".to_string(),
            },
        );
        assert!(matches!(outcome, SystemOutcome::Rejected { .. }));
        assert_eq!(snapshot, before);
    }

    #[test]
    fn awaiting_goal_is_not_a_valid_target() {
        let mut snapshot = in_progress();
        let outcome = apply_system_action(
            &mut snapshot,
            &SystemAction::ChangePhase {
                phase: "AWAITING_GOAL".to_string(),
            },
        );
        assert!(matches!(outcome, SystemOutcome::Rejected { .. }));
        assert_eq!(snapshot.phase, Phase::Planning);
    }

    #[test]
    fn completed_status_forces_awaiting_next_goal() {
        let mut snapshot = in_progress();
        apply_system_action(
            &mut snapshot,
            &SystemAction::ChangeStatus {
                status: "Completed".to_string(),
            },
        );
        assert_completed(&snapshot);
    }

    #[test]
    fn request_user_input_completes_project() {
        let mut snapshot = in_progress();
        apply_system_action(&mut snapshot, &SystemAction::RequestUserInput { prompt: None });
        assert_completed(&snapshot);
    }

    #[test]
    fn awaiting_next_goal_phase_completes_project() {
        let mut snapshot = in_progress();
        apply_system_action(
            &mut snapshot,
            &SystemAction::ChangePhase {
                phase: "AWAITING_NEXT_GOAL".to_string(),
            },
        );
        assert_completed(&snapshot);
    }

    #[test]
    fn long_goal_names_are_shortened() {
        let name = project_name_from_goal(&"x".repeat(100));
        assert_eq!(name.chars().count(), PROJECT_NAME_MAX_CHARS + 3);
    }
}
