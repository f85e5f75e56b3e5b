//! Approval prompts and the decisions that answer them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ApprovalError, ApprovalResult};
use crate::agent::SuspendedRun;
use crate::transcript::Origin;

/// A human's answer to one approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Deny,
    /// Approve with replacement arguments.
    Modify,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approve => "approve",
            Verdict::Deny => "deny",
            Verdict::Modify => "modify",
        }
    }

    /// Whether the call runs after this verdict.
    pub fn permits_execution(&self) -> bool {
        !matches!(self, Verdict::Deny)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub request_id: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub decider: String,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    fn new(request_id: impl Into<String>, verdict: Verdict, decider: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            verdict,
            modified_arguments: None,
            reason: None,
            decider: decider.into(),
            decided_at: Utc::now(),
        }
    }

    pub fn approve(request_id: impl Into<String>, decider: impl Into<String>) -> Self {
        Self::new(request_id, Verdict::Approve, decider)
    }

    pub fn deny(
        request_id: impl Into<String>,
        decider: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(request_id, Verdict::Deny, decider).with_reason(reason)
    }

    pub fn modify(
        request_id: impl Into<String>,
        decider: impl Into<String>,
        arguments: Value,
    ) -> Self {
        let mut decision = Self::new(request_id, Verdict::Modify, decider);
        decision.modified_arguments = Some(arguments);
        decision
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// A `modify` decision must carry object-shaped replacement arguments.
    pub fn validate(&self) -> ApprovalResult<()> {
        if self.verdict != Verdict::Modify {
            return Ok(());
        }
        match &self.modified_arguments {
            Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(ApprovalError::InvalidDecision {
                request_id: self.request_id.clone(),
                reason: "modified arguments must be a JSON object".into(),
            }),
            None => Err(ApprovalError::InvalidDecision {
                request_id: self.request_id.clone(),
                reason: "modify verdict without modified arguments".into(),
            }),
        }
    }
}

/// What the approver is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPrompt {
    pub request_id: String,
    pub tool_name: String,
    pub description: String,
    pub arguments: Value,
    pub origin: Origin,
    pub requested_at: DateTime<Utc>,
}

impl ApprovalPrompt {
    pub fn for_run(run: &SuspendedRun) -> Self {
        Self {
            request_id: run.awaiting.id.clone(),
            tool_name: run.awaiting.tool_name.clone(),
            description: run.tool_description.clone(),
            arguments: run.awaiting.arguments.clone(),
            origin: run.awaiting.origin.clone(),
            requested_at: run.awaiting.requested_at,
        }
    }
}

impl fmt::Display for ApprovalPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} wants to call '{}' with {}",
            self.origin.stage, self.origin.agent, self.tool_name, self.arguments
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn modify_requires_object_arguments() {
        assert!(ApprovalDecision::modify("r1", "alice", json!({"suite": "smoke"}))
            .validate()
            .is_ok());
        assert!(matches!(
            ApprovalDecision::modify("r1", "alice", json!("smoke")).validate(),
            Err(ApprovalError::InvalidDecision { .. })
        ));

        let mut bare = ApprovalDecision::approve("r1", "alice");
        bare.verdict = Verdict::Modify;
        assert!(matches!(
            bare.validate(),
            Err(ApprovalError::InvalidDecision { .. })
        ));
    }

    #[test]
    fn deny_carries_reason() {
        let d = ApprovalDecision::deny("r1", "bob", "not on a Friday");
        assert_eq!(d.reason.as_deref(), Some("not on a Friday"));
        assert!(!d.verdict.permits_execution());
    }

    #[test]
    fn serde_roundtrip() {
        let d = ApprovalDecision::approve("r1", "alice").with_reason("LGTM");
        let json = serde_json::to_string(&d).unwrap();
        let back: ApprovalDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
