//! One orchestration cycle: orchestrator decision, effects, optional specialist
//! turn, stagnation bookkeeping, checkpoint.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::agents::orchestrator::{request_directive, summarize};
use crate::agents::specialist::run_specialist;
use crate::core::actions::{ActionBundle, DelegateTaskAction};
use crate::core::lifecycle::{SystemOutcome, apply_system_action, set_goal};
use crate::core::parser::parse_directive;
use crate::core::precedence::{SpecialistPlan, plan_cycle};
use crate::core::registry::assign;
use crate::core::snapshot::{Snapshot, SpecialistOutcome};
use crate::core::stagnation::StagnationVerdict;
use crate::effects::{observe_directory, observe_file, run_command};
use crate::io::event_log::{EventKind, EventRecord};
use crate::io::inference::Inference;
use crate::io::operator::{EscalationChoice, Operator};
use crate::io::shell::ShellRunner;
use crate::session::Session;

/// What happened during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based cycle number within this session.
    pub cycle: u32,
    pub directive_failed: bool,
    pub system: Option<SystemOutcome>,
    pub specialist: Option<SpecialistOutcome>,
    /// The stagnation guard fired and the operator was consulted.
    pub escalated: bool,
}

/// Effects of one applied directive.
#[derive(Debug, Default)]
struct Applied {
    system: Option<SystemOutcome>,
    specialist: Option<SpecialistOutcome>,
}

/// Run a single cycle against the persisted snapshot.
///
/// A backend failure is recorded and the cycle still completes; errors are
/// reserved for persistence and prompt rendering failures.
#[instrument(skip_all, fields(cycle = session.cycles + 1))]
pub async fn run_cycle<I: Inference, S: ShellRunner, O: Operator>(
    session: &mut Session<I, S, O>,
) -> Result<CycleReport> {
    session.cycles += 1;
    let cycle = session.cycles;
    session.log(EventRecord::new(
        "system",
        EventKind::CycleStarted,
        format!("cycle {cycle}"),
    ));

    let mut snapshot = session.reload().await?;
    snapshot.workspace_structure = Some(
        session
            .files()
            .summarize(session.config.workspace_summary_entries),
    );

    let directive =
        request_directive(session.inference(), session.prompts(), &snapshot).await?;
    snapshot.clear_observations();
    let actor = snapshot.orchestrator.id.clone();

    let mut report = CycleReport {
        cycle,
        directive_failed: directive.failed,
        system: None,
        specialist: None,
        escalated: false,
    };

    if directive.failed {
        warn!(cycle, "orchestrator inference failed");
        session.log(EventRecord::new(
            &actor,
            EventKind::InferenceFailed,
            directive.text.trim(),
        ));
        snapshot.record_event(
            &actor,
            format!("inference failed: {}", directive.text.trim()),
            Utc::now(),
        );
        finish_cycle(session, &mut snapshot).await?;
        return Ok(report);
    }

    let summary = summarize(&directive.bundle);
    info!(cycle, directive = %summary, "directive received");
    session.log(
        EventRecord::new(&actor, EventKind::Directive, summary.clone())
            .with_data(json!({ "text": directive.text, "actions": directive.bundle })),
    );
    snapshot.record_event(&actor, format!("directive: {summary}"), Utc::now());

    let applied = apply_directive(session, &mut snapshot, &directive.bundle, &directive.text).await?;
    report.system = applied.system;
    report.specialist = applied.specialist;

    let waited = directive
        .bundle
        .system_action
        .as_ref()
        .is_some_and(|action| action.is_wait());
    if !waited {
        session.guard.reset();
    } else if let StagnationVerdict::Escalate { consecutive_waits } = session.guard.record_wait()
    {
        report.escalated = true;
        if let Some(outcome) = escalate(session, &mut snapshot, consecutive_waits).await? {
            report.specialist = Some(outcome);
        }
    }

    finish_cycle(session, &mut snapshot).await?;
    Ok(report)
}

/// Apply one parsed directive following the precedence table.
async fn apply_directive<I: Inference, S: ShellRunner, O: Operator>(
    session: &mut Session<I, S, O>,
    snapshot: &mut Snapshot,
    bundle: &ActionBundle,
    text: &str,
) -> Result<Applied> {
    let plan = plan_cycle(bundle);
    let actor = snapshot.orchestrator.id.clone();
    let mut applied = Applied::default();

    if let Some(action) = &bundle.system_action {
        let outcome = apply_system_action(snapshot, action);
        let message = format!("{}: {}", action.kind(), outcome.describe());
        session.log(
            EventRecord::new(&actor, EventKind::SystemAction, message.clone())
                .with_data(json!({ "action": action })),
        );
        snapshot.record_event(&actor, message, Utc::now());
        session.checkpoint(snapshot).await?;
        applied.system = Some(outcome);
    }

    if bundle.list_directory_action.is_some() || bundle.read_file_action.is_some() {
        if let Some(action) = &bundle.list_directory_action {
            observe_directory(session, snapshot, action).await;
        }
        if let Some(action) = &bundle.read_file_action {
            observe_file(session, snapshot, action).await;
        }
        session.checkpoint(snapshot).await?;
    }

    if plan.run_command
        && let Some(action) = &bundle.command_action
    {
        run_command(session, snapshot, action).await;
        session.checkpoint(snapshot).await?;
    }

    let Some(delegation) = &bundle.delegate_task_action else {
        return Ok(applied);
    };
    match plan.specialist {
        SpecialistPlan::None => {}
        SpecialistPlan::Skip => {
            let message = format!(
                "delegation to {} skipped: project ended this cycle",
                delegation.role
            );
            session.log(EventRecord::new(&actor, EventKind::Delegation, message.clone()));
            snapshot.record_event(&actor, message, Utc::now());
        }
        SpecialistPlan::Run | SpecialistPlan::AssignOnly => {
            let Some(specialist_id) = delegate(session, snapshot, delegation).await? else {
                return Ok(applied);
            };
            if plan.specialist == SpecialistPlan::Run {
                applied.specialist =
                    Some(run_specialist(session, snapshot, &specialist_id, text).await?);
            }
        }
    }
    Ok(applied)
}

/// Assign the delegated task; `None` when no specialist can take it.
async fn delegate<I: Inference, S: ShellRunner, O: Operator>(
    session: &mut Session<I, S, O>,
    snapshot: &mut Snapshot,
    delegation: &DelegateTaskAction,
) -> Result<Option<String>> {
    let actor = snapshot.orchestrator.id.clone();
    let now = Utc::now();
    match assign(
        &mut snapshot.specialists,
        &delegation.role,
        &delegation.description,
        &mut session.ids,
        now,
    ) {
        Ok(assignment) => {
            let message = format!(
                "delegated to {} ({}): {}",
                assignment.specialist_id, assignment.role, delegation.description
            );
            session.log(
                EventRecord::new(&actor, EventKind::Delegation, message.clone()).with_data(
                    json!({
                        "specialist": assignment.specialist_id,
                        "role": assignment.role.as_str(),
                        "reused": assignment.reused,
                    }),
                ),
            );
            snapshot.record_event(&actor, message, now);
            snapshot.orchestrator.current_focus =
                Some(format!("{}: {}", assignment.role, delegation.description));
            session.checkpoint(snapshot).await?;
            Ok(Some(assignment.specialist_id))
        }
        Err(err) => {
            let message = err.to_string();
            session.log(EventRecord::new(&actor, EventKind::Delegation, message.clone()));
            snapshot.record_event(&actor, message, now);
            Ok(None)
        }
    }
}

/// Consult the operator after too many consecutive WAITs.
async fn escalate<I: Inference, S: ShellRunner, O: Operator>(
    session: &mut Session<I, S, O>,
    snapshot: &mut Snapshot,
    consecutive_waits: u32,
) -> Result<Option<SpecialistOutcome>> {
    warn!(consecutive_waits, "orchestrator is stagnating; escalating");
    session.log(EventRecord::new(
        "system",
        EventKind::Stagnation,
        format!("{consecutive_waits} consecutive WAIT directives"),
    ));
    let choice = session.operator().escalate(consecutive_waits)?;
    session.guard.reset();

    match choice {
        EscalationChoice::ContinueWaiting => {
            session.log(EventRecord::new("user", EventKind::UserInput, "continue waiting"));
            snapshot.record_event("user", "chose to keep waiting", Utc::now());
            Ok(None)
        }
        EscalationChoice::InjectAction(text) => {
            session.log(
                EventRecord::new("user", EventKind::UserInput, "injected action")
                    .with_data(json!({ "text": text })),
            );
            snapshot.record_event("user", "injected an action", Utc::now());
            let bundle = parse_directive(&text, None);
            let applied = apply_directive(session, snapshot, &bundle, &text).await?;
            Ok(applied.specialist)
        }
        EscalationChoice::ReplaceGoal(goal) => {
            set_goal(snapshot, &goal, Utc::now());
            session.log(EventRecord::new("user", EventKind::Goal, goal.trim()));
            session.checkpoint(snapshot).await?;
            Ok(None)
        }
    }
}

async fn finish_cycle<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    snapshot: &mut Snapshot,
) -> Result<()> {
    snapshot.truncate_event_log(session.config.event_window);
    session.checkpoint(snapshot).await
}
