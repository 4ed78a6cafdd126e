//! The closed set of registered specialist roles.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialistRole {
    Architect,
    Developer,
    Tester,
    Reviewer,
    Writer,
}

impl SpecialistRole {
    pub const ALL: [SpecialistRole; 5] = [
        SpecialistRole::Architect,
        SpecialistRole::Developer,
        SpecialistRole::Tester,
        SpecialistRole::Reviewer,
        SpecialistRole::Writer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SpecialistRole::Architect => "Architect",
            SpecialistRole::Developer => "Developer",
            SpecialistRole::Tester => "Tester",
            SpecialistRole::Reviewer => "Reviewer",
            SpecialistRole::Writer => "Writer",
        }
    }

    /// Resolve a delegated role name; case and separators are ignored.
    pub fn from_name(name: &str) -> Option<SpecialistRole> {
        let wanted: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().to_ascii_lowercase() == wanted)
    }

    /// Fixed capability list given to every specialist of this role.
    pub fn capabilities(self) -> &'static [&'static str] {
        match self {
            SpecialistRole::Architect => &[
                "system design",
                "module boundaries",
                "technology selection",
                "directory layout",
            ],
            SpecialistRole::Developer => &[
                "implementation",
                "refactoring",
                "file creation",
                "dependency wiring",
            ],
            SpecialistRole::Tester => &[
                "test design",
                "test implementation",
                "bug reporting",
                "fix verification",
            ],
            SpecialistRole::Reviewer => &["code review", "consistency checks", "bug reporting"],
            SpecialistRole::Writer => &["documentation", "usage guides", "changelogs"],
        }
    }
}

impl fmt::Display for SpecialistRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
