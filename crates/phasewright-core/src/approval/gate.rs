//! The approval gate: parks suspended runs and hands each back exactly once.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use uuid::Uuid;

use super::decision::{ApprovalDecision, ApprovalPrompt};
use super::error::{ApprovalError, ApprovalResult};
use super::store::{ApprovalRecord, ApprovalStatus, ApprovalStore, MemoryApprovalStore};
use crate::agent::SuspendedRun;
use crate::obs;

/// Handle returned by [`ApprovalGate::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub request_id: String,
    pub run_id: Uuid,
    pub prompt: ApprovalPrompt,
}

/// Suspends and resolves human-gated tool invocations.
///
/// Every check-then-write runs under one lock, so two concurrent resolutions
/// of the same request cannot both succeed. Re-opening a gate over the same
/// store sees approvals left in flight by an earlier process.
pub struct ApprovalGate {
    store: Arc<dyn ApprovalStore>,
    guard: Mutex<()>,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryApprovalStore::new()))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Park `run` until a decision arrives.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::SlotOccupied` if the same agent run already
    /// has an outstanding approval.
    pub fn submit(&self, run: SuspendedRun) -> ApprovalResult<PendingApproval> {
        let _guard = self.lock();

        let run_id = run.run_id();
        if let Some(existing) = self
            .store
            .list()?
            .into_iter()
            .find(|r| r.status.is_pending() && r.run.run_id() == run_id)
        {
            return Err(ApprovalError::SlotOccupied {
                run_id,
                request_id: existing.request_id().to_string(),
            });
        }

        let record = ApprovalRecord::pending(run)?;
        self.store.save(&record)?;
        obs::emit_approval_requested(
            &run_id.to_string(),
            record.request_id(),
            &record.prompt.tool_name,
        );

        Ok(PendingApproval {
            request_id: record.request_id().to_string(),
            run_id,
            prompt: record.prompt,
        })
    }

    /// Validate `decision` against `request_id` without applying it.
    ///
    /// Callers use this to prepare everything a resume needs before
    /// [`resolve`](Self::resolve) consumes the request.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub fn check(
        &self,
        request_id: &str,
        decision: &ApprovalDecision,
    ) -> ApprovalResult<ApprovalRecord> {
        let _guard = self.lock();
        self.checked(request_id, decision)
    }

    /// Apply `decision` to `request_id` and return the parked run.
    ///
    /// # Errors
    ///
    /// - `UnknownRequest` if nothing was submitted under `request_id`
    /// - `DecisionMismatch` if the decision names another request
    /// - `AlreadyResolved` if a decision was already applied
    /// - `InvalidDecision` if a `modify` verdict carries no usable arguments
    ///
    /// The stored record is untouched on every error.
    pub fn resolve(
        &self,
        request_id: &str,
        decision: &ApprovalDecision,
    ) -> ApprovalResult<SuspendedRun> {
        let _guard = self.lock();

        let mut record = self.checked(request_id, decision)?;
        record.status = ApprovalStatus::Resolved {
            decision: decision.clone(),
        };
        self.store.save(&record)?;
        obs::emit_approval_resolved(request_id, decision.verdict.as_str(), &decision.decider);

        Ok(record.run)
    }

    /// Attach a continuation to a pending request.
    pub fn attach<T: Serialize>(&self, request_id: &str, payload: &T) -> ApprovalResult<()> {
        let _guard = self.lock();

        let mut record = self.load_pending(request_id)?;
        record.set_continuation(payload)?;
        self.store.save(&record)?;
        Ok(())
    }

    /// Put a resolved request back to pending.
    ///
    /// Used when the resume that follows a resolution could not start, so
    /// the request can be decided again.
    pub fn reopen(&self, request_id: &str) -> ApprovalResult<()> {
        let _guard = self.lock();

        let mut record = self.record(request_id)?;
        if record.status.is_pending() {
            return Ok(());
        }
        record.status = ApprovalStatus::Pending;
        self.store.save(&record)?;
        tracing::warn!(event = "approval.reopened", request_id = %request_id);
        Ok(())
    }

    fn checked(
        &self,
        request_id: &str,
        decision: &ApprovalDecision,
    ) -> ApprovalResult<ApprovalRecord> {
        let record = self.record(request_id)?;
        if decision.request_id != request_id {
            return Err(ApprovalError::DecisionMismatch {
                expected: request_id.to_string(),
                actual: decision.request_id.clone(),
            });
        }
        if !record.status.is_pending() {
            return Err(ApprovalError::AlreadyResolved {
                request_id: request_id.to_string(),
            });
        }
        decision.validate()?;
        Ok(record)
    }

    fn load_pending(&self, request_id: &str) -> ApprovalResult<ApprovalRecord> {
        let record = self.record(request_id)?;
        if !record.status.is_pending() {
            return Err(ApprovalError::AlreadyResolved {
                request_id: request_id.to_string(),
            });
        }
        Ok(record)
    }

    /// Outstanding prompts, oldest first.
    pub fn pending(&self) -> ApprovalResult<Vec<ApprovalPrompt>> {
        let mut prompts: Vec<ApprovalPrompt> = self
            .store
            .list()?
            .into_iter()
            .filter(|r| r.status.is_pending())
            .map(|r| r.prompt)
            .collect();
        prompts.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        Ok(prompts)
    }

    /// The stored record for `request_id`, resolved or not.
    pub fn record(&self, request_id: &str) -> ApprovalResult<ApprovalRecord> {
        self.store
            .load(request_id)?
            .ok_or_else(|| ApprovalError::UnknownRequest {
                request_id: request_id.to_string(),
            })
    }
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate").finish_non_exhaustive()
    }
}
