//! Precedence between the orthogonal actions of one orchestrator directive.
//!
//! Ranking, highest first: system action, direct command, delegation.

use super::actions::{ActionBundle, SystemAction};
use super::types::{Phase, ProjectStatus};

/// What the loop should do with a delegation after applying a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialistPlan {
    /// No delegation was requested.
    None,
    /// Assign and run the specialist this cycle.
    Run,
    /// Assign the task but do not run it this cycle.
    AssignOnly,
    /// Drop the delegation entirely.
    Skip,
}

/// Per-cycle execution plan derived from an action bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePlan {
    pub run_command: bool,
    pub specialist: SpecialistPlan,
    /// The system action finishes the current project.
    pub ends_project: bool,
}

/// Whether a system action moves the project into `AWAITING_NEXT_GOAL`.
pub fn ends_project(action: &SystemAction) -> bool {
    match action {
        SystemAction::RequestUserInput { .. } => true,
        SystemAction::ChangePhase { phase } => {
            Phase::lookup(phase) == Some(Phase::AwaitingNextGoal)
        }
        SystemAction::ChangeStatus { status } => {
            ProjectStatus::lookup(status) == Some(ProjectStatus::Completed)
        }
        SystemAction::Wait { .. } => false,
    }
}

pub fn plan_cycle(bundle: &ActionBundle) -> CyclePlan {
    let system = bundle.system_action.as_ref();
    let ends = system.is_some_and(ends_project);
    let suppresses_specialist = system.is_some_and(|action| {
        matches!(
            action,
            SystemAction::Wait { .. } | SystemAction::RequestUserInput { .. }
        )
    });
    let run_command = bundle.command_action.is_some() && !ends;

    let specialist = match &bundle.delegate_task_action {
        None => SpecialistPlan::None,
        Some(_) if ends => SpecialistPlan::Skip,
        Some(_) if suppresses_specialist || run_command => SpecialistPlan::AssignOnly,
        Some(_) => SpecialistPlan::Run,
    };

    CyclePlan {
        run_command,
        specialist,
        ends_project: ends,
    }
}
