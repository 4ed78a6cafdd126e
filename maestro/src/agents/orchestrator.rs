//! Orchestrator turn: prompt, infer, parse.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::actions::ActionBundle;
use crate::core::parser::parse_directive;
use crate::core::snapshot::Snapshot;
use crate::io::inference::{InferRequest, Inference, is_inference_error};
use crate::io::prompt::PromptBuilder;

/// One orchestrator decision.
#[derive(Debug, Clone)]
pub struct Directive {
    pub text: String,
    pub bundle: ActionBundle,
    /// The backend failed; `bundle` is empty.
    pub failed: bool,
}

/// Ask the orchestrator for its next directive.
///
/// Only prompt rendering can fail here; a backend failure comes back as a
/// `failed` directive.
#[instrument(skip_all, fields(phase = %snapshot.phase))]
pub async fn request_directive<I: Inference>(
    inference: &I,
    prompts: &PromptBuilder,
    snapshot: &Snapshot,
) -> Result<Directive> {
    let prompt = prompts.build_orchestrator(snapshot)?;
    debug!(prompt_bytes = prompt.len(), "orchestrator prompt built");
    let text = inference
        .infer(&InferRequest {
            actor: snapshot.orchestrator.id.clone(),
            prompt,
        })
        .await;

    if is_inference_error(&text) {
        return Ok(Directive {
            text,
            bundle: ActionBundle::default(),
            failed: true,
        });
    }
    let bundle = parse_directive(&text, None);
    Ok(Directive {
        text,
        bundle,
        failed: false,
    })
}

/// One-line summary of a directive for the event log.
pub fn summarize(bundle: &ActionBundle) -> String {
    let mut parts = Vec::new();
    if let Some(action) = &bundle.system_action {
        parts.push(action.kind().to_string());
    }
    if let Some(delegation) = &bundle.delegate_task_action {
        parts.push(format!("DELEGATE_TASK {}", delegation.role));
    }
    if let Some(command) = &bundle.command_action {
        parts.push(format!("RUN_TEST_COMMAND {}", command.command));
    }
    if let Some(list) = &bundle.list_directory_action {
        parts.push(format!("LIST_DIRECTORY {}", list.path));
    }
    if let Some(read) = &bundle.read_file_action {
        parts.push(format!("READ_FILE {}", read.path));
    }
    if parts.is_empty() {
        "no actionable directive".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actions::SystemAction;
    use crate::test_support::ScriptedInference;

    #[tokio::test]
    async fn parses_successful_directive() {
        let inference = ScriptedInference::new(["SYSTEM_ACTION: CHANGE_PHASE phase=\"Design\""]);
        let directive = request_directive(
            &inference,
            &PromptBuilder::new(60_000, 15),
            &Snapshot::default(),
        )
        .await
        .expect("directive");
        assert!(!directive.failed);
        assert_eq!(
            directive.bundle.system_action,
            Some(SystemAction::ChangePhase {
                phase: "Design".to_string()
            })
        );
        assert_eq!(inference.requests()[0].actor, "orchestrator");
    }

    #[tokio::test]
    async fn backend_failure_is_an_empty_directive() {
        let inference = ScriptedInference::new(Vec::<String>::new());
        let directive = request_directive(
            &inference,
            &PromptBuilder::new(60_000, 15),
            &Snapshot::default(),
        )
        .await
        .expect("directive");
        assert!(directive.failed);
        assert!(directive.bundle.is_empty());
    }

    #[test]
    fn summary_lists_present_actions() {
        let bundle = parse_directive(
            "SYSTEM_ACTION: WAIT\nACTION: READ_FILE path=\"a.rs\"",
            None,
        );
        assert_eq!(summarize(&bundle), "WAIT, READ_FILE a.rs");
        assert_eq!(summarize(&ActionBundle::default()), "no actionable directive");
    }
}
