//! Specialist registry: creation, reuse and release of role-scoped workers.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::roles::SpecialistRole;
use super::snapshot::Specialist;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error("no specialist available for role {0:?}")]
    NoSpecialistAvailable(String),
}

/// Result of a successful assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub specialist_id: String,
    pub role: SpecialistRole,
    /// False when a new specialist was appended to the roster.
    pub reused: bool,
}

/// Generates specialist ids that are unique for the process lifetime.
///
/// Ids take the form `<role>-<seed>-<n>`; the seed distinguishes sessions so
/// ids stay unique across restarts that reload an existing roster.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String,
    next: u64,
}

impl IdGenerator {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            next: 1,
        }
    }

    /// Seed derived from the current wall clock.
    pub fn from_clock(now: DateTime<Utc>) -> Self {
        Self::new(format!("{:x}", now.timestamp_millis()))
    }

    fn next_id(&mut self, role: SpecialistRole, roster: &[Specialist]) -> String {
        loop {
            let candidate = format!(
                "{}-{}-{}",
                role.as_str().to_ascii_lowercase(),
                self.seed,
                self.next
            );
            self.next += 1;
            if roster.iter().all(|s| s.id != candidate) {
                return candidate;
            }
        }
    }
}

/// Assign `task` to a specialist of `role_name`.
///
/// Preference order: a busy specialist of that role already holding the same
/// task, then the first idle specialist of that role, then a new specialist.
pub fn assign(
    roster: &mut Vec<Specialist>,
    role_name: &str,
    task: &str,
    ids: &mut IdGenerator,
    now: DateTime<Utc>,
) -> Result<Assignment, AssignError> {
    let role = SpecialistRole::from_name(role_name)
        .ok_or_else(|| AssignError::NoSpecialistAvailable(role_name.to_string()))?;

    if let Some(existing) = roster
        .iter()
        .find(|s| s.role == role && s.task_description.as_deref() == Some(task))
    {
        return Ok(Assignment {
            specialist_id: existing.id.clone(),
            role,
            reused: true,
        });
    }

    if let Some(idle) = roster.iter_mut().find(|s| s.role == role && s.is_idle()) {
        idle.task_description = Some(task.to_string());
        return Ok(Assignment {
            specialist_id: idle.id.clone(),
            role,
            reused: true,
        });
    }

    let id = ids.next_id(role, roster);
    roster.push(Specialist {
        id: id.clone(),
        role,
        capabilities: role.capabilities().iter().map(|c| c.to_string()).collect(),
        task_description: Some(task.to_string()),
        created_at: now,
    });
    Ok(Assignment {
        specialist_id: id,
        role,
        reused: false,
    })
}

/// Return a specialist to idle. Returns false if the id is unknown.
pub fn release(roster: &mut [Specialist], id: &str) -> bool {
    match roster.iter_mut().find(|s| s.id == id) {
        Some(specialist) => {
            specialist.task_description = None;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> IdGenerator {
        IdGenerator::new("t")
    }

    #[test]
    fn creates_specialist_when_none_idle() {
        let mut roster = Vec::new();
        let assignment =
            assign(&mut roster, "Developer", "build", &mut ids(), Utc::now()).expect("assign");
        assert!(!assignment.reused);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, "developer-t-1");
        assert_eq!(roster[0].task_description.as_deref(), Some("build"));
        assert!(!roster[0].capabilities.is_empty());
    }

    #[test]
    fn reuses_idle_specialist_of_same_role() {
        let mut roster = Vec::new();
        let mut ids = ids();
        let first = assign(&mut roster, "Developer", "one", &mut ids, Utc::now()).expect("assign");
        assert!(release(&mut roster, &first.specialist_id));

        let second = assign(&mut roster, "developer", "two", &mut ids, Utc::now()).expect("assign");
        assert!(second.reused);
        assert_eq!(second.specialist_id, first.specialist_id);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].task_description.as_deref(), Some("two"));
    }

    #[test]
    fn busy_specialist_forces_new_one() {
        let mut roster = Vec::new();
        let mut ids = ids();
        assign(&mut roster, "Tester", "one", &mut ids, Utc::now()).expect("assign");
        let second = assign(&mut roster, "Tester", "two", &mut ids, Utc::now()).expect("assign");
        assert!(!second.reused);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn same_task_redelegation_returns_holder() {
        let mut roster = Vec::new();
        let mut ids = ids();
        let first = assign(&mut roster, "Writer", "docs", &mut ids, Utc::now()).expect("assign");
        let again = assign(&mut roster, "Writer", "docs", &mut ids, Utc::now()).expect("assign");
        assert_eq!(first.specialist_id, again.specialist_id);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let mut roster = Vec::new();
        let err = assign(&mut roster, "Astronaut", "fly", &mut ids(), Utc::now()).unwrap_err();
        assert_eq!(err, AssignError::NoSpecialistAvailable("Astronaut".to_string()));
        assert!(roster.is_empty());
    }

    #[test]
    fn generated_ids_skip_existing_roster_ids() {
        let mut roster = Vec::new();
        let mut first_gen = ids();
        assign(&mut roster, "Developer", "a", &mut first_gen, Utc::now()).expect("assign");
        let mut restarted = ids();
        let second = assign(&mut roster, "Developer", "b", &mut restarted, Utc::now()).expect("assign");
        assert_eq!(second.specialist_id, "developer-t-2");
    }
}
