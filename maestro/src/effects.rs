//! Side effects requested by directives: file mutations, observations, and
//! direct commands.
//!
//! Each function mutates the in-memory snapshot and appends to the event log;
//! checkpointing is left to the caller.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::actions::{CommandAction, FileAction, PathAction};
use crate::core::snapshot::Snapshot;
use crate::core::types::FileOpResult;
use crate::io::event_log::{EventKind, EventRecord};
use crate::io::file_store::FileOpError;
use crate::io::inference::Inference;
use crate::io::operator::Operator;
use crate::io::shell::ShellRunner;
use crate::session::Session;

/// Submit every action to the queue, then collect results in submission order.
pub async fn apply_file_actions<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    actions: &[FileAction],
) -> Vec<FileOpResult> {
    let tickets: Vec<_> = actions
        .iter()
        .map(|action| session.queue().submit(action.clone()))
        .collect();
    let mut results = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        results.push(ticket.wait().await);
    }
    debug!(count = results.len(), "file actions applied");
    results
}

/// `LIST_DIRECTORY`: store the listing, or the error text, as the next
/// orchestrator observation.
pub async fn observe_directory<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    snapshot: &mut Snapshot,
    action: &PathAction,
) {
    let store = session.files().clone();
    let path = action.path.clone();
    let listing = read_only(move || store.list_directory(&path)).await;
    let summary = match &listing {
        Ok(_) => format!("listed {}", action.path),
        Err(err) => format!("list {} failed: {err}", action.path),
    };
    finish_observation(session, snapshot, summary, &action.path);
    snapshot.last_directory_listing = Some(listing.unwrap_or_else(|err| err.to_string()));
}

/// `READ_FILE`: store the (capped) contents, or the error text.
pub async fn observe_file<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    snapshot: &mut Snapshot,
    action: &PathAction,
) {
    let store = session.files().clone();
    let path = action.path.clone();
    let limit = session.config.file_read_limit_bytes;
    let contents = read_only(move || store.read_file(&path, limit)).await;
    let summary = match &contents {
        Ok(_) => format!("read {}", action.path),
        Err(err) => format!("read {} failed: {err}", action.path),
    };
    finish_observation(session, snapshot, summary, &action.path);
    snapshot.last_file_read_content = Some(match contents {
        Ok(text) => format!("{}:\n{text}", action.path),
        Err(err) => err.to_string(),
    });
}

/// `RUN_TEST_COMMAND`: run through the shell adapter and keep its output.
#[instrument(skip_all, fields(command = %action.command))]
pub async fn run_command<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    snapshot: &mut Snapshot,
    action: &CommandAction,
) {
    let output = session.shell().run(&action.command).await;
    let actor = snapshot.orchestrator.id.clone();
    session.log(
        EventRecord::new(&actor, EventKind::Command, format!("ran `{}`", action.command))
            .with_data(json!({ "command": action.command, "output": output })),
    );
    snapshot.record_event(&actor, format!("ran command `{}`", action.command), Utc::now());
    snapshot.orchestrator.current_focus = Some(format!("Running command: {}", action.command));
    snapshot.last_console_output = Some(output);
}

fn finish_observation<I: Inference, S: ShellRunner, O: Operator>(
    session: &Session<I, S, O>,
    snapshot: &mut Snapshot,
    summary: String,
    path: &str,
) {
    let actor = snapshot.orchestrator.id.clone();
    session.log(
        EventRecord::new(&actor, EventKind::Observation, summary.clone())
            .with_data(json!({ "path": path })),
    );
    snapshot.record_event(actor, summary, Utc::now());
}

async fn read_only<F>(op: F) -> Result<String, FileOpError>
where
    F: FnOnce() -> Result<String, FileOpError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result,
        Err(err) => Err(FileOpError::Io(format!("read task failed: {err}"))),
    }
}

