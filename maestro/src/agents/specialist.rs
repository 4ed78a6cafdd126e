//! Specialist turn: run the delegated task and apply what the specialist asked for.

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument};

use crate::core::actions::TaskStatus;
use crate::core::bugs::apply_bug_actions;
use crate::core::parser::parse_directive;
use crate::core::registry::release;
use crate::core::snapshot::{FileVerification, Snapshot, SpecialistEvent, SpecialistOutcome};
use crate::effects::apply_file_actions;
use crate::io::event_log::{EventKind, EventRecord};
use crate::io::inference::{InferRequest, Inference, is_inference_error};
use crate::io::operator::Operator;
use crate::io::prompt::{SpecialistPromptInput, directive_preview};
use crate::io::shell::ShellRunner;
use crate::session::Session;

/// Execute one turn for `specialist_id`, checkpointing after each category of
/// side effect.
///
/// On `TASK_COMPLETE` the specialist is released and the task recorded. On
/// `TASK_BLOCKED`, on a backend failure, or without any marker, the task
/// stays assigned.
#[instrument(skip_all, fields(specialist = specialist_id))]
pub async fn run_specialist<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    snapshot: &mut Snapshot,
    specialist_id: &str,
    directive: &str,
) -> Result<SpecialistOutcome> {
    let specialist = snapshot
        .specialist(specialist_id)
        .cloned()
        .ok_or_else(|| anyhow!("specialist {specialist_id} is not on the roster"))?;
    let task = specialist.task_description.clone().unwrap_or_default();
    let role = specialist.role.to_string();

    let preview = directive_preview(directive, session.config.directive_preview_chars);
    let prompt = session.prompts().build_specialist(&SpecialistPromptInput {
        specialist: &specialist,
        snapshot,
        directive_preview: &preview,
    })?;
    let response = session
        .inference()
        .infer(&InferRequest {
            actor: specialist.id.clone(),
            prompt,
        })
        .await;

    if is_inference_error(&response) {
        let detail = response.trim().to_string();
        finish_turn(
            session,
            snapshot,
            &specialist.id,
            &role,
            SpecialistOutcome::Failed,
            Some(detail),
        )
        .await?;
        return Ok(SpecialistOutcome::Failed);
    }

    let bundle = parse_directive(&response, Some(&task));

    if !bundle.file_actions.is_empty() {
        let results = apply_file_actions(session, &bundle.file_actions).await;
        let failed = results.iter().filter(|r| !r.success).count();
        let summary = format!(
            "applied {} file operation(s), {failed} failed",
            results.len()
        );
        session.log(
            EventRecord::new(&specialist.id, EventKind::FileVerification, summary.clone())
                .with_data(json!({ "task": task, "results": results })),
        );
        snapshot.record_event(&specialist.id, summary, Utc::now());
        snapshot.push_file_verification(FileVerification {
            agent_id: specialist.id.clone(),
            task: task.clone(),
            results,
            timestamp: Utc::now(),
        });
        session.checkpoint(snapshot).await?;
    }

    if !bundle.bug_actions.is_empty() {
        let batch = apply_bug_actions(
            &mut snapshot.project,
            &bundle.bug_actions,
            &specialist.id,
            Utc::now(),
        );
        if !batch.is_empty() {
            let summary = format!("bugs: {}", batch.describe());
            session.log(EventRecord::new(&specialist.id, EventKind::Bugs, summary.clone()));
            snapshot.record_event(&specialist.id, summary, Utc::now());
        }
        session.checkpoint(snapshot).await?;
    }

    let (outcome, detail) = match bundle.task_status {
        Some(TaskStatus::Complete) => {
            release(&mut snapshot.specialists, &specialist.id);
            snapshot.push_completed_task(task.clone());
            (SpecialistOutcome::Completed, Some(task))
        }
        Some(TaskStatus::Blocked { reason }) => (SpecialistOutcome::Blocked, Some(reason)),
        None => (SpecialistOutcome::InProgress, None),
    };
    finish_turn(session, snapshot, &specialist.id, &role, outcome, detail).await?;
    Ok(outcome)
}

async fn finish_turn<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    snapshot: &mut Snapshot,
    specialist_id: &str,
    role: &str,
    outcome: SpecialistOutcome,
    detail: Option<String>,
) -> Result<()> {
    let message = match &detail {
        Some(detail) => format!("{}: {detail}", outcome.as_str()),
        None => outcome.as_str().to_string(),
    };
    info!(outcome = outcome.as_str(), "specialist turn finished");
    session.log(
        EventRecord::new(specialist_id, EventKind::SpecialistOutcome, message.clone())
            .with_data(json!({ "role": role, "outcome": outcome })),
    );
    snapshot.record_event(specialist_id, message, Utc::now());
    snapshot.last_specialist_event = Some(SpecialistEvent {
        specialist_id: specialist_id.to_string(),
        role: role.to_string(),
        outcome,
        detail,
        timestamp: Utc::now(),
    });
    session.checkpoint(snapshot).await
}
