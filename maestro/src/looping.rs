//! Multi-cycle loop for `maestro run`.

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::core::lifecycle::set_goal;
use crate::core::types::Phase;
use crate::cycle::{CycleReport, run_cycle};
use crate::io::event_log::{EventKind, EventRecord};
use crate::io::inference::Inference;
use crate::io::operator::{GoalRequest, Operator};
use crate::io::shell::ShellRunner;
use crate::session::Session;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopOptions {
    /// Goal applied before the first cycle, replacing any current project.
    pub initial_goal: Option<String>,
    /// Overrides `max_cycles` from the config; `0` means unlimited.
    pub max_cycles: Option<u32>,
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The operator declined to enter a goal.
    OperatorExit,
    CycleLimit { max_cycles: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub cycles_executed: u32,
    pub stop: LoopStop,
}

/// Run cycles until the operator exits at a goal prompt or the cycle limit
/// is reached.
///
/// Stops immediately on any error (persistence, prompt rendering, a broken
/// operator channel).
pub async fn run_loop<I, S, O, F>(
    session: &mut Session<I, S, O>,
    options: LoopOptions,
    mut on_cycle: F,
) -> Result<LoopOutcome>
where
    I: Inference,
    S: ShellRunner,
    O: Operator,
    F: FnMut(&CycleReport),
{
    let max_cycles = options.max_cycles.unwrap_or(session.config.max_cycles);
    let mut pending_goal = options
        .initial_goal
        .filter(|goal| !goal.trim().is_empty());
    let mut cycles_executed = 0u32;

    loop {
        if max_cycles > 0 && cycles_executed >= max_cycles {
            info!(max_cycles, "cycle limit reached");
            return Ok(LoopOutcome {
                cycles_executed,
                stop: LoopStop::CycleLimit { max_cycles },
            });
        }

        let mut snapshot = session.reload().await?;
        let goal = match pending_goal.take() {
            Some(goal) => Some(goal),
            None if snapshot.phase.awaits_goal() => {
                let request = if snapshot.phase == Phase::AwaitingNextGoal {
                    GoalRequest::Next
                } else {
                    GoalRequest::Initial
                };
                match session.operator().request_goal(request)? {
                    Some(goal) => Some(goal),
                    None => {
                        session.log(EventRecord::new("user", EventKind::UserInput, "exit"));
                        return Ok(LoopOutcome {
                            cycles_executed,
                            stop: LoopStop::OperatorExit,
                        });
                    }
                }
            }
            None => None,
        };
        if let Some(goal) = goal {
            set_goal(&mut snapshot, &goal, Utc::now());
            session.log(EventRecord::new("user", EventKind::Goal, goal.trim()));
            session.checkpoint(&snapshot).await?;
        }

        let report = run_cycle(session).await?;
        cycles_executed += 1;
        on_cycle(&report);
    }
}
