//! Synchronous operator interaction: goal entry and stagnation escalation.

use std::io::{BufRead, StdinLock, Stdout, Write};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

/// Why the loop is asking for a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalRequest {
    Initial,
    /// The previous project completed.
    Next,
}

/// Operator decision when the orchestrator keeps waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationChoice {
    ContinueWaiting,
    /// Directive text to parse and apply as if the orchestrator emitted it.
    InjectAction(String),
    ReplaceGoal(String),
}

pub trait Operator {
    /// `None` means the operator wants to stop (empty input, `exit`, or EOF).
    fn request_goal(&self, request: GoalRequest) -> Result<Option<String>>;

    fn escalate(&self, consecutive_waits: u32) -> Result<EscalationChoice>;
}

/// Line-based operator over any reader/writer pair (stdin/stdout in the CLI).
pub struct ConsoleOperator<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl ConsoleOperator<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    fn say(&self, text: &str) -> Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| anyhow!("operator output lock poisoned"))?;
        out.write_all(text.as_bytes()).context("write operator prompt")?;
        out.flush().context("flush operator prompt")
    }

    /// Next line without its terminator; `None` on EOF.
    fn read_line(&self) -> Result<Option<String>> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| anyhow!("operator input lock poisoned"))?;
        let mut line = String::new();
        let read = input.read_line(&mut line).context("read operator input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Lines up to a lone `.` (or EOF).
    fn read_block(&self) -> Result<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            if line.trim() == "." {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn request_goal(&self, request: GoalRequest) -> Result<Option<String>> {
        let prompt = match request {
            GoalRequest::Initial => "Project goal (empty or 'exit' to quit): ",
            GoalRequest::Next => "Project complete. Next goal (empty or 'exit' to quit): ",
        };
        self.say(prompt)?;
        let Some(line) = self.read_line()? else {
            return Ok(None);
        };
        let goal = line.trim();
        if goal.is_empty() || goal.eq_ignore_ascii_case("exit") {
            return Ok(None);
        }
        Ok(Some(goal.to_string()))
    }

    fn escalate(&self, consecutive_waits: u32) -> Result<EscalationChoice> {
        self.say(&format!(
            "\nThe orchestrator has waited {consecutive_waits} times in a row.\n\
             1) continue waiting\n\
             2) inject an action\n\
             3) replace the goal\n"
        ))?;
        loop {
            self.say("Choice [1-3]: ")?;
            let Some(choice) = self.read_line()? else {
                return Ok(EscalationChoice::ContinueWaiting);
            };
            match choice.trim() {
                "1" | "" => return Ok(EscalationChoice::ContinueWaiting),
                "2" => {
                    self.say("Enter directive text; finish with a line containing only '.':\n")?;
                    let text = self.read_block()?;
                    if text.trim().is_empty() {
                        return Ok(EscalationChoice::ContinueWaiting);
                    }
                    return Ok(EscalationChoice::InjectAction(text));
                }
                "3" => {
                    self.say("New goal: ")?;
                    let goal = self.read_line()?.unwrap_or_default();
                    if goal.trim().is_empty() {
                        return Ok(EscalationChoice::ContinueWaiting);
                    }
                    return Ok(EscalationChoice::ReplaceGoal(goal.trim().to_string()));
                }
                _ => self.say("Please answer 1, 2 or 3.\n")?,
            }
        }
    }
}
