//! Stage vocabulary: delivery phases, Design & Build roles, and the `Stage`
//! tag that names either one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The delivery phases, in their canonical order.
///
/// `Ord` follows declaration order, which is also the default workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovery,
    Requirements,
    Architecture,
    DesignBuild,
    Testing,
    Deployment,
}

impl Phase {
    /// All phases in canonical order.
    pub const ALL: [Phase; 6] = [
        Phase::Discovery,
        Phase::Requirements,
        Phase::Architecture,
        Phase::DesignBuild,
        Phase::Testing,
        Phase::Deployment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Requirements => "requirements",
            Phase::Architecture => "architecture",
            Phase::DesignBuild => "design_build",
            Phase::Testing => "testing",
            Phase::Deployment => "deployment",
        }
    }

    /// Human-readable title used in prompts.
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Discovery => "Discovery",
            Phase::Requirements => "Requirements",
            Phase::Architecture => "Architecture",
            Phase::DesignBuild => "Design & Build",
            Phase::Testing => "Testing",
            Phase::Deployment => "Deployment",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| format!("unknown phase '{s}'"))
    }
}

/// Specialised roles of the Design & Build team, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    DevLead,
    Frontend,
    Backend,
    AutomationTester,
    NfrTester,
    PenTester,
}

impl Role {
    /// The full team in canonical order.
    pub const ALL: [Role; 6] = [
        Role::DevLead,
        Role::Frontend,
        Role::Backend,
        Role::AutomationTester,
        Role::NfrTester,
        Role::PenTester,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::DevLead => "dev_lead",
            Role::Frontend => "frontend",
            Role::Backend => "backend",
            Role::AutomationTester => "automation_tester",
            Role::NfrTester => "nfr_tester",
            Role::PenTester => "pen_tester",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Role::DevLead => "Dev Lead",
            Role::Frontend => "Frontend Developer",
            Role::Backend => "Backend Developer",
            Role::AutomationTester => "Automation Tester",
            Role::NfrTester => "NFR Tester",
            Role::PenTester => "Pen Tester",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// What an agent is bound to: a whole phase, or one role in the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Stage {
    Phase(Phase),
    Role(Role),
}

impl Stage {
    pub fn title(&self) -> &'static str {
        match self {
            Stage::Phase(p) => p.title(),
            Stage::Role(r) => r.title(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Phase(p) => write!(f, "phase:{p}"),
            Stage::Role(r) => write!(f, "role:{r}"),
        }
    }
}

impl From<Phase> for Stage {
    fn from(p: Phase) -> Self {
        Stage::Phase(p)
    }
}

impl From<Role> for Stage {
    fn from(r: Role) -> Self {
        Stage::Role(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_matches_declaration() {
        let mut sorted = Phase::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Phase::ALL.to_vec());
        assert!(Phase::Discovery < Phase::Deployment);
    }

    #[test]
    fn phase_parses_kebab_and_snake_case() {
        assert_eq!("design-build".parse::<Phase>(), Ok(Phase::DesignBuild));
        assert_eq!("design_build".parse::<Phase>(), Ok(Phase::DesignBuild));
        assert_eq!(" Testing ".parse::<Phase>(), Ok(Phase::Testing));
        assert!("shipping".parse::<Phase>().is_err());
    }

    #[test]
    fn role_parses_and_displays() {
        assert_eq!("pen-tester".parse::<Role>(), Ok(Role::PenTester));
        assert_eq!(Role::NfrTester.to_string(), "nfr_tester");
    }

    #[test]
    fn stage_display_is_prefixed() {
        assert_eq!(Stage::from(Phase::Testing).to_string(), "phase:testing");
        assert_eq!(Stage::from(Role::Backend).to_string(), "role:backend");
    }

    #[test]
    fn stage_serde_is_tagged() {
        let json = serde_json::to_value(Stage::Role(Role::DevLead)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "role", "name": "dev_lead"}));
    }
}
