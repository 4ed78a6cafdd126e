//! `maestro status` rendering.

use std::fmt::Write as _;

use crate::core::bugs::open_bugs;
use crate::core::snapshot::Snapshot;
use crate::io::config::MaestroConfig;

const RECENT_EVENTS: usize = 5;

/// Human-readable summary of the persisted snapshot.
pub fn render_status(snapshot: &Snapshot, config: &MaestroConfig) -> String {
    let mut out = String::new();
    let project = &snapshot.project;
    let name = if project.name.is_empty() {
        "(none)"
    } else {
        project.name.as_str()
    };
    let _ = writeln!(out, "project: {name}");
    if !project.goal.is_empty() {
        let _ = writeln!(out, "goal: {}", project.goal);
    }
    let _ = writeln!(out, "phase: {}", snapshot.phase);
    let _ = writeln!(out, "status: {}", project.status);
    let _ = writeln!(
        out,
        "focus: {}",
        snapshot
            .orchestrator
            .current_focus
            .as_deref()
            .unwrap_or("none")
    );

    if snapshot.specialists.is_empty() {
        let _ = writeln!(out, "specialists: none");
    } else {
        let _ = writeln!(out, "specialists:");
        for specialist in &snapshot.specialists {
            let task = specialist.task_description.as_deref().unwrap_or("idle");
            let _ = writeln!(out, "  {} [{}] {task}", specialist.id, specialist.role);
        }
    }

    let open: Vec<_> = open_bugs(project).collect();
    let _ = writeln!(out, "open bugs: {}", open.len());
    for bug in open {
        let _ = writeln!(out, "  {} ({}) {}", bug.id, bug.severity, bug.description);
    }
    let _ = writeln!(out, "completed tasks: {}", project.completed_tasks.len());

    if let Some(event) = &snapshot.last_specialist_event {
        let _ = write!(
            out,
            "last specialist: {} {}",
            event.specialist_id,
            event.outcome.as_str()
        );
        match &event.detail {
            Some(detail) => {
                let _ = writeln!(out, " ({detail})");
            }
            None => out.push('\n'),
        }
    }

    let skip = snapshot.event_log.len().saturating_sub(RECENT_EVENTS);
    if skip < snapshot.event_log.len() {
        let _ = writeln!(out, "recent events:");
        for entry in &snapshot.event_log[skip..] {
            let _ = writeln!(
                out,
                "  {} {}: {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.actor,
                entry.event
            );
        }
    }
    let _ = write!(out, "workspace: {}", config.workspace_dir);
    out
}
