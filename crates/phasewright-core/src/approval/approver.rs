//! The human boundary: whoever answers approval prompts.

use std::time::Duration;

use async_trait::async_trait;

use super::decision::{ApprovalDecision, ApprovalPrompt};

/// Answers approval prompts.
///
/// The core waits on `decide` for as long as it takes. Deployments that
/// need a deadline wrap their approver in [`TimeoutApprover`].
#[async_trait]
pub trait Approver: Send + Sync {
    async fn decide(&self, prompt: &ApprovalPrompt) -> ApprovalDecision;
}

/// Approves everything. For unattended runs and tests.
#[derive(Debug, Clone)]
pub struct AutoApprover {
    decider: String,
}

impl AutoApprover {
    pub fn new(decider: impl Into<String>) -> Self {
        Self {
            decider: decider.into(),
        }
    }
}

impl Default for AutoApprover {
    fn default() -> Self {
        Self::new("auto-approver")
    }
}

#[async_trait]
impl Approver for AutoApprover {
    async fn decide(&self, prompt: &ApprovalPrompt) -> ApprovalDecision {
        ApprovalDecision::approve(&prompt.request_id, &self.decider)
    }
}

/// Denies when the wrapped approver does not answer within `timeout`.
#[derive(Debug, Clone)]
pub struct TimeoutApprover<A> {
    inner: A,
    timeout: Duration,
}

impl<A: Approver> TimeoutApprover<A> {
    pub fn new(inner: A, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<A: Approver> Approver for TimeoutApprover<A> {
    async fn decide(&self, prompt: &ApprovalPrompt) -> ApprovalDecision {
        match tokio::time::timeout(self.timeout, self.inner.decide(prompt)).await {
            Ok(decision) => decision,
            Err(_) => {
                tracing::warn!(
                    event = "approval.timed_out",
                    request_id = %prompt.request_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                );
                ApprovalDecision::deny(
                    &prompt.request_id,
                    "timeout",
                    format!("no decision within {}s", self.timeout.as_secs()),
                )
            }
        }
    }
}
