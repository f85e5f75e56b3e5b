//! Run state: the loop's states, recorded invocations, and the serializable
//! snapshot a run leaves behind when it waits for approval.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::config::AgentConfig;
use super::error::AgentError;
use crate::stage::Stage;
use crate::transcript::{ConversationTurn, Origin, ToolCall, ToolCallRequest, ToolResultRecord};

/// States of the execution loop, in the order a run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Init,
    AwaitingModel,
    AwaitingToolExecution,
    AwaitingApproval,
    ToolExecuted,
    Done,
    Failed,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Done | AgentState::Failed)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Init => "init",
            AgentState::AwaitingModel => "awaiting_model",
            AgentState::AwaitingToolExecution => "awaiting_tool_execution",
            AgentState::AwaitingApproval => "awaiting_approval",
            AgentState::ToolExecuted => "tool_executed",
            AgentState::Done => "done",
            AgentState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What happened to one requested tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Executed { output: Value, duration_ms: u64 },
    /// The handler or argument validation failed.
    Failed { kind: String, message: String },
    /// A human denied the call.
    Denied { decider: String, reason: Option<String> },
    /// The tool is unknown or outside the agent's allowed subset.
    Rejected { reason: String },
    /// Tips-only mode: the call was turned into advice instead of run.
    Advisory,
}

/// One requested tool call and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub request: ToolCallRequest,
    pub outcome: InvocationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

impl ToolInvocation {
    pub fn executed(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Executed { .. })
    }
}

/// Everything a run has accumulated so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    /// Config snapshot taken when the run started.
    pub config: AgentConfig,
    pub input: String,
    pub transcript: Vec<ConversationTurn>,
    /// Model turns taken.
    pub iterations: u32,
    pub invocations: Vec<ToolInvocation>,
    pub trace: Vec<AgentState>,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub(crate) fn new(config: AgentConfig, input: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            input: input.to_string(),
            transcript: Vec::new(),
            iterations: 0,
            invocations: Vec::new(),
            trace: vec![AgentState::Init],
            started_at: Utc::now(),
        }
    }

    pub fn origin(&self) -> Origin {
        Origin {
            stage: self.config.stage,
            agent: self.config.name.clone(),
            run_id: self.run_id,
        }
    }

    pub(crate) fn enter(&mut self, state: AgentState) {
        self.trace.push(state);
    }

    /// Every tool call the model asked for during this run.
    pub fn requested_calls(&self) -> Vec<ToolCall> {
        self.transcript
            .iter()
            .flat_map(|t| t.tool_calls.iter().cloned())
            .collect()
    }
}

/// A run parked at `AwaitingApproval`.
///
/// Self-contained and serializable: resuming needs only this value and the
/// matching decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedRun {
    pub run: RunState,
    /// The call waiting for a decision.
    pub awaiting: ToolCallRequest,
    pub tool_description: String,
    /// Calls from the same model turn not yet processed, in order.
    pub remaining: Vec<ToolCall>,
    /// Results already produced in the current turn.
    pub turn_results: Vec<ToolResultRecord>,
    pub suspended_at: DateTime<Utc>,
}

impl SuspendedRun {
    pub fn request_id(&self) -> &str {
        &self.awaiting.id
    }

    pub fn run_id(&self) -> Uuid {
        self.run.run_id
    }

    pub fn stage(&self) -> Stage {
        self.run.config.stage
    }

    pub fn config(&self) -> &AgentConfig {
        &self.run.config
    }
}

/// Terminal result of an agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    pub run_id: Uuid,
    pub stage: Stage,
    pub success: bool,
    pub output: String,
    pub invocations: Vec<ToolInvocation>,
    pub iterations: u32,
    pub error: Option<AgentError>,
    pub trace: Vec<AgentState>,
    pub transcript: Vec<ConversationTurn>,
    pub started_at: DateTime<Utc>,
}

impl AgentOutcome {
    pub(crate) fn done(run: RunState, output: String) -> Self {
        Self::finish(run, true, output, None)
    }

    pub(crate) fn failed(run: RunState, error: AgentError) -> Self {
        Self::finish(run, false, String::new(), Some(error))
    }

    fn finish(mut run: RunState, success: bool, output: String, error: Option<AgentError>) -> Self {
        run.enter(if success {
            AgentState::Done
        } else {
            AgentState::Failed
        });
        Self {
            run_id: run.run_id,
            stage: run.config.stage,
            success,
            output,
            invocations: run.invocations,
            iterations: run.iterations,
            error,
            trace: run.trace,
            transcript: run.transcript,
            started_at: run.started_at,
        }
    }
}

/// What a call to `start` or `resume` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Finished(AgentOutcome),
    Suspended(SuspendedRun),
}

impl AgentStep {
    pub fn is_suspended(&self) -> bool {
        matches!(self, AgentStep::Suspended(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Phase;

    #[test]
    fn outcome_closes_trace() {
        let run = RunState::new(AgentConfig::for_phase(Phase::Discovery), "go");
        let outcome = AgentOutcome::failed(run, AgentError::IterationLimitExceeded { limit: 1 });
        assert!(!outcome.success);
        assert_eq!(outcome.trace, vec![AgentState::Init, AgentState::Failed]);
    }

    #[test]
    fn suspended_run_survives_json() {
        let mut run = RunState::new(AgentConfig::for_phase(Phase::Testing), "run it");
        run.enter(AgentState::AwaitingModel);
        let call = ToolCall {
            id: "c1".into(),
            name: "run_tests".into(),
            arguments: serde_json::json!({"suite": "unit"}),
        };
        let awaiting = ToolCallRequest::from_call(&call, run.origin(), Utc::now());
        let suspended = SuspendedRun {
            run,
            awaiting,
            tool_description: "Run the test suite".into(),
            remaining: vec![],
            turn_results: vec![],
            suspended_at: Utc::now(),
        };
        let json = serde_json::to_string(&suspended).unwrap();
        let back: SuspendedRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back, suspended);
    }
}
