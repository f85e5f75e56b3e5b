//! Results reported by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentOutcome, ToolInvocation};
use crate::approval::PendingApproval;
use crate::stage::Stage;

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseError {
    /// Stable snake_case code, e.g. `iteration_limit_exceeded`.
    pub kind: String,
    pub message: String,
}

/// Outcome of one phase or role run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub stage: Stage,
    pub success: bool,
    pub output: String,
    pub tool_invocations: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PhaseError>,
    /// Wall-clock time from run start, including any wait for approval.
    pub duration_ms: u64,
    pub iterations: u32,
    pub run_id: Uuid,
}

impl PhaseResult {
    pub fn from_outcome(outcome: AgentOutcome, now: DateTime<Utc>) -> Self {
        let duration_ms = (now - outcome.started_at).num_milliseconds().max(0) as u64;
        Self {
            stage: outcome.stage,
            success: outcome.success,
            output: outcome.output,
            tool_invocations: outcome.invocations,
            error: outcome.error.map(|e| PhaseError {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
            duration_ms,
            iterations: outcome.iterations,
            run_id: outcome.run_id,
        }
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}

/// What `run_phase` (or a resumed single-stage run) produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseRun {
    Completed(PhaseResult),
    AwaitingApproval(PendingApproval),
}

impl PhaseRun {
    pub fn completed(self) -> Option<PhaseResult> {
        match self {
            PhaseRun::Completed(r) => Some(r),
            PhaseRun::AwaitingApproval(_) => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingApproval> {
        match self {
            PhaseRun::Completed(_) => None,
            PhaseRun::AwaitingApproval(p) => Some(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SequenceStatus {
    /// Every stage in range ran.
    Completed,
    /// `stage` failed and the sequence stopped there.
    Halted { stage: Stage },
    /// `stage` is parked on an approval; resolve it to continue.
    AwaitingApproval { stage: Stage, request_id: String },
}

/// Results of a workflow or team run: only stages actually attempted, in
/// execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceReport {
    pub results: Vec<PhaseResult>,
    pub status: SequenceStatus,
    pub pending: Option<PendingApproval>,
}

impl SequenceReport {
    /// True when every stage ran and succeeded.
    pub fn succeeded(&self) -> bool {
        self.status == SequenceStatus::Completed && self.results.iter().all(|r| r.success)
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.results.iter().map(|r| r.stage).collect()
    }

    pub fn last_output(&self) -> Option<&str> {
        self.results.last().map(|r| r.output.as_str())
    }
}

/// What `resolve_approval` produced, shaped by what was suspended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Phase(PhaseRun),
    Sequence(SequenceReport),
}

/// History entry for one finished stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub stage: Stage,
    pub success: bool,
    pub iterations: u32,
    pub tool_invocations: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_result(result: &PhaseResult, finished_at: DateTime<Utc>) -> Self {
        Self {
            run_id: result.run_id,
            stage: result.stage,
            success: result.success,
            iterations: result.iterations,
            tool_invocations: result.tool_invocations.len(),
            duration_ms: result.duration_ms,
            error_kind: result.error_kind().map(str::to_string),
            finished_at,
        }
    }
}
