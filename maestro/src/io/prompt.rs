//! Prompt construction for orchestrator and specialist turns.
//!
//! Prompts are a pure function of the snapshot. Templates mark each section
//! with `<!-- section:KEY required|droppable -->`; when the rendered prompt is
//! over budget, droppable sections are removed in a fixed order and the last
//! remaining section is truncated as a final resort.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::bugs::open_bugs;
use crate::core::roles::SpecialistRole;
use crate::core::snapshot::{Snapshot, Specialist, SpecialistOutcome};

const ORCHESTRATOR_TEMPLATE: &str = include_str!("prompts/orchestrator.md");
const SPECIALIST_TEMPLATE: &str = include_str!("prompts/specialist.md");

const ORCHESTRATOR_DROP_ORDER: [&str; 6] = [
    "workspace",
    "history",
    "completed",
    "verifications",
    "bugs",
    "observations",
];
const SPECIALIST_DROP_ORDER: [&str; 4] = ["workspace", "completed", "bugs", "directive"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

#[derive(Debug, Clone, Serialize)]
struct SpecialistView {
    id: String,
    role: String,
    task: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct BugView {
    id: String,
    severity: String,
    status: String,
    description: String,
}

#[derive(Debug, Clone, Serialize)]
struct LastEventView {
    specialist_id: String,
    role: String,
    outcome: &'static str,
    detail: Option<String>,
    blocked: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ObservationView {
    title: &'static str,
    body: String,
}

#[derive(Debug, Clone, Serialize)]
struct VerificationView {
    agent_id: String,
    task: String,
    succeeded: usize,
    failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct HistoryView {
    timestamp: String,
    actor: String,
    event: String,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("orchestrator", ORCHESTRATOR_TEMPLATE)
            .context("load orchestrator template")?;
        env.add_template("specialist", SPECIALIST_TEMPLATE)
            .context("load specialist template")?;
        Ok(Self { env })
    }

    fn render_orchestrator(&self, snapshot: &Snapshot, history_limit: usize) -> Result<String> {
        let project = &snapshot.project;
        let specialists: Vec<SpecialistView> = snapshot
            .specialists
            .iter()
            .map(|s| SpecialistView {
                id: s.id.clone(),
                role: s.role.to_string(),
                task: s.task_description.clone(),
            })
            .collect();
        let last_event = snapshot.last_specialist_event.as_ref().map(|e| LastEventView {
            specialist_id: e.specialist_id.clone(),
            role: e.role.clone(),
            outcome: e.outcome.as_str(),
            detail: e.detail.clone(),
            blocked: e.outcome == SpecialistOutcome::Blocked,
        });

        let mut observations = Vec::new();
        if let Some(body) = &snapshot.last_console_output {
            observations.push(ObservationView {
                title: "Command output",
                body: body.clone(),
            });
        }
        if let Some(body) = &snapshot.last_directory_listing {
            observations.push(ObservationView {
                title: "Directory listing",
                body: body.clone(),
            });
        }
        if let Some(body) = &snapshot.last_file_read_content {
            observations.push(ObservationView {
                title: "File contents",
                body: body.clone(),
            });
        }

        let verifications: Vec<VerificationView> = snapshot
            .file_verifications
            .iter()
            .map(|v| VerificationView {
                agent_id: v.agent_id.clone(),
                task: v.task.clone(),
                succeeded: v.results.iter().filter(|r| r.success).count(),
                failures: v
                    .results
                    .iter()
                    .filter(|r| !r.success)
                    .map(|r| format!("{} ({})", r.path, r.error.as_deref().unwrap_or("error")))
                    .collect(),
            })
            .collect();

        let skip = snapshot.event_log.len().saturating_sub(history_limit);
        let history: Vec<HistoryView> = snapshot
            .event_log
            .iter()
            .skip(skip)
            .map(|e| HistoryView {
                timestamp: e.timestamp.format("%H:%M:%S").to_string(),
                actor: e.actor.clone(),
                event: e.event.clone(),
            })
            .collect();

        let roles: Vec<&str> = SpecialistRole::ALL.iter().map(|r| r.as_str()).collect();
        let template = self.env.get_template("orchestrator")?;
        let rendered = template.render(context! {
            project_name => project.name.as_str(),
            goal => project.goal.as_str(),
            phase => snapshot.phase.as_str(),
            status => project.status.as_str(),
            focus => snapshot.orchestrator.current_focus.as_deref().unwrap_or("none"),
            roles => roles,
            specialists => specialists,
            last_event => last_event,
            observations => observations,
            bugs => bug_views(snapshot),
            verifications => verifications,
            completed => project.completed_tasks.clone(),
            history => history,
            workspace => snapshot.workspace_structure.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered)
    }

    fn render_specialist(&self, input: &SpecialistPromptInput<'_>) -> Result<String> {
        let specialist = input.specialist;
        let snapshot = input.snapshot;
        let template = self.env.get_template("specialist")?;
        let rendered = template.render(context! {
            id => specialist.id.as_str(),
            role => specialist.role.as_str(),
            capabilities => specialist.capabilities.clone(),
            task => specialist.task_description.as_deref().unwrap_or_default(),
            project_name => snapshot.project.name.as_str(),
            goal => snapshot.project.goal.as_str(),
            phase => snapshot.phase.as_str(),
            directive => (!input.directive_preview.trim().is_empty()).then(|| input.directive_preview.trim()),
            bugs => bug_views(snapshot),
            completed => snapshot.project.completed_tasks.clone(),
            workspace => snapshot.workspace_structure.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered)
    }
}

fn bug_views(snapshot: &Snapshot) -> Vec<BugView> {
    open_bugs(&snapshot.project)
        .map(|bug| BugView {
            id: bug.id.clone(),
            severity: bug.severity.clone(),
            status: bug.status.clone(),
            description: bug.description.clone(),
        })
        .collect()
}

/// Inputs for one specialist prompt.
#[derive(Debug, Clone, Copy)]
pub struct SpecialistPromptInput<'a> {
    pub specialist: &'a Specialist,
    pub snapshot: &'a Snapshot,
    /// Orchestrator directive, already cut to the preview length.
    pub directive_preview: &'a str,
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section content including its header, excluding the marker.
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in `drop_order` until the prompt fits, then
/// truncate the last section if it still does not.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize, drop_order: &[&str]) {
    for key in drop_order {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if before_len > allowed {
        const MARKER: &str = "\n[truncated]";
        let keep = floor_char_boundary(&last.content, allowed.saturating_sub(MARKER.len()));
        last.content.truncate(keep);
        if allowed > MARKER.len() {
            last.content.push_str(MARKER);
        }
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
    history_limit: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize, history_limit: usize) -> Self {
        Self {
            budget_bytes,
            history_limit,
        }
    }

    pub fn build_orchestrator(&self, snapshot: &Snapshot) -> Result<String> {
        let rendered = PromptEngine::new()?
            .render_orchestrator(snapshot, self.history_limit)
            .context("render orchestrator prompt")?;
        Ok(self.fit(&rendered, &ORCHESTRATOR_DROP_ORDER))
    }

    pub fn build_specialist(&self, input: &SpecialistPromptInput<'_>) -> Result<String> {
        let rendered = PromptEngine::new()?
            .render_specialist(input)
            .context("render specialist prompt")?;
        Ok(self.fit(&rendered, &SPECIALIST_DROP_ORDER))
    }

    fn fit(&self, rendered: &str, drop_order: &[&str]) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes, drop_order);
        render_sections(&sections)
    }
}

/// First `max_chars` characters of a directive, marked when cut.
pub fn directive_preview(directive: &str, max_chars: usize) -> String {
    let mut chars = directive.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}\n[directive truncated]", &directive[..cut]),
        None => directive.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::core::lifecycle::set_goal;
    use crate::core::snapshot::SpecialistEvent;

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        set_goal(&mut snapshot, "Build a calculator", Utc::now());
        snapshot
    }

    /// Verifies orchestrator sections appear in a stable order.
    #[test]
    fn orchestrator_sections_are_ordered() {
        let mut snap = snapshot();
        snap.last_console_output = Some("3 passed".to_string());
        snap.workspace_structure = Some("src/\n  main.rs".to_string());
        let prompt = PromptBuilder::new(60_000, 15)
            .build_orchestrator(&snap)
            .expect("build");

        let contract = prompt.find("### Orchestrator Contract").expect("contract");
        let state = prompt.find("### Project State").expect("state");
        let roster = prompt.find("### Specialists").expect("roster");
        let observations = prompt.find("### Observations").expect("observations");
        let history = prompt.find("### Recent History").expect("history");
        let workspace = prompt.find("### Workspace Structure").expect("workspace");
        assert!(contract < state && state < roster && roster < observations);
        assert!(observations < history && history < workspace);
        assert!(prompt.contains("Goal: Build a calculator"));
        assert!(prompt.contains("3 passed"));
    }

    #[test]
    fn blocked_event_forbids_wait() {
        let mut snap = snapshot();
        snap.last_specialist_event = Some(SpecialistEvent {
            specialist_id: "developer-t-1".to_string(),
            role: "Developer".to_string(),
            outcome: SpecialistOutcome::Blocked,
            detail: Some("missing API key".to_string()),
            timestamp: Utc::now(),
        });
        let prompt = PromptBuilder::new(60_000, 15)
            .build_orchestrator(&snap)
            .expect("build");
        assert!(prompt.contains("### Last Specialist Event"));
        assert!(prompt.contains("missing API key"));
        assert!(prompt.contains("Never answer a\nblocked report with WAIT"));
    }

    /// Verifies budget enforcement drops low-priority sections first while
    /// required ones remain.
    #[test]
    fn budget_drops_less_critical_sections_first() {
        let mut snap = snapshot();
        snap.workspace_structure = Some("file.rs\n".repeat(500));
        for n in 0..10 {
            snap.record_event("system", "x".repeat(100) + &n.to_string(), Utc::now());
        }
        let prompt = PromptBuilder::new(3_000, 15)
            .build_orchestrator(&snap)
            .expect("build");
        assert!(!prompt.contains("### Workspace Structure"));
        assert!(prompt.contains("### Orchestrator Contract"));
        assert!(prompt.contains("### Project State"));
        assert!(prompt.contains("### Specialists"));
    }

    #[test]
    fn specialist_prompt_names_exact_completion_marker() {
        let snap = snapshot();
        let specialist = Specialist {
            id: "developer-t-1".to_string(),
            role: SpecialistRole::Developer,
            capabilities: vec!["implementation".to_string()],
            task_description: Some("Implement add()".to_string()),
            created_at: Utc::now(),
        };
        let prompt = PromptBuilder::new(60_000, 15)
            .build_specialist(&SpecialistPromptInput {
                specialist: &specialist,
                snapshot: &snap,
                directive_preview: "ACTION: DELEGATE_TASK role=\"Developer\"",
            })
            .expect("build");
        assert!(prompt.contains("TASK_COMPLETE: Implement add()"));
        assert!(prompt.contains("### Orchestrator Directive"));
        assert!(prompt.contains("Capabilities: implementation"));
    }

    #[test]
    fn directive_preview_cuts_on_char_boundary() {
        assert_eq!(directive_preview("héllo", 2), "hé\n[directive truncated]");
        assert_eq!(directive_preview("short", 10), "short");
    }

    #[test]
    fn truncation_marks_last_section() {
        let mut sections = vec![
            ParsedSection {
                key: "contract".to_string(),
                required: true,
                content: "a".repeat(10),
            },
            ParsedSection {
                key: "state".to_string(),
                required: true,
                content: "b".repeat(100),
            },
        ];
        apply_budget(&mut sections, 50, &[]);
        assert!(sections[1].content.ends_with("[truncated]"));
        assert!(total_len(&sections) <= 50);
    }
}
