//! The agent execution loop.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, Instrument};

use super::advisory::synthesize_tips;
use super::config::{AgentConfig, WorkflowMode};
use super::error::{AgentError, AgentResult};
use super::state::{
    AgentOutcome, AgentState, AgentStep, InvocationOutcome, RunState, SuspendedRun,
    ToolInvocation,
};
use crate::approval::{ApprovalDecision, Verdict};
use crate::metrics::Metrics;
use crate::obs;
use crate::provider::{ProviderClient, ProviderRequest, ProviderResponse};
use crate::tools::ToolRegistry;
use crate::transcript::{ConversationTurn, ToolCall, ToolCallRequest, ToolResultRecord};

/// Calls of the current model turn that are still being worked through.
struct TurnWork {
    remaining: VecDeque<ToolCall>,
    results: Vec<ToolResultRecord>,
}

enum Dispatch {
    Result(ToolResultRecord),
    Suspend {
        request: ToolCallRequest,
        description: String,
    },
}

/// An agent bound to one stage configuration, a tool registry and a
/// provider.
pub struct Agent {
    config: AgentConfig,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn ProviderClient>,
    metrics: Arc<Metrics>,
}

impl Agent {
    /// Build an agent.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Configuration` if an allowed tool is missing
    /// from the registry or `max_iterations` is zero.
    pub fn new(
        config: AgentConfig,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn ProviderClient>,
    ) -> AgentResult<Self> {
        if config.max_iterations == 0 {
            return Err(AgentError::configuration(format!(
                "{}: max_iterations must be greater than zero",
                config.name
            )));
        }
        if let Some(missing) = config.allowed_tools.iter().find(|t| !tools.contains(t)) {
            return Err(AgentError::configuration(format!(
                "{}: allowed tool '{missing}' is not registered",
                config.name
            )));
        }
        Ok(Self {
            config,
            tools,
            provider,
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Report counters into a shared [`Metrics`] instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run from `Init` until the run finishes or suspends for approval.
    ///
    /// `context` is output carried forward from earlier stages.
    pub async fn start(&self, input: &str, context: Option<&str>) -> AgentStep {
        let mut run = RunState::new(self.config.clone(), input);
        run.transcript
            .push(ConversationTurn::system(&self.config.system_prompt));
        run.transcript
            .push(ConversationTurn::user(compose_user_turn(&self.config, input, context)));

        let run_id = run.run_id.to_string();
        let stage = run.config.stage.to_string();
        let span = obs::run_span(&run_id, &stage);
        span.in_scope(|| obs::emit_phase_started(&run_id, &stage, &run.config.name));
        self.drive(run, None).instrument(span).await
    }

    /// Continue a suspended run with the decision for its awaited call.
    ///
    /// Uses the config snapshot stored in `suspended`, not this agent's
    /// current config.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::ApprovalMismatch` if the decision is for another
    /// request. `suspended` is never modified.
    pub async fn resume(
        &self,
        suspended: &SuspendedRun,
        decision: &ApprovalDecision,
    ) -> AgentResult<AgentStep> {
        if decision.request_id != suspended.awaiting.id {
            return Err(AgentError::ApprovalMismatch {
                expected: suspended.awaiting.id.clone(),
                actual: decision.request_id.clone(),
            });
        }

        let mut run = suspended.run.clone();
        let mut work = TurnWork {
            remaining: suspended.remaining.iter().cloned().collect(),
            results: suspended.turn_results.clone(),
        };
        let request = suspended.awaiting.clone();
        let decider = decision.decider.clone();

        let record = if decision.verdict.permits_execution() {
            let arguments = match decision.verdict {
                Verdict::Modify => decision.modified_arguments.clone(),
                _ => None,
            };
            self.execute(&mut run, request, arguments, Some(decider)).await
        } else {
            self.metrics.inc_approvals_denied();
            let reason = decision.reason.as_deref().unwrap_or("no reason given");
            let message = format!("Tool call denied by {decider}: {reason}");
            debug!(tool = %request.tool_name, request_id = %request.id, "tool call denied");
            let record = ToolResultRecord::error(&request.as_call(), message);
            run.invocations.push(ToolInvocation {
                request,
                outcome: InvocationOutcome::Denied {
                    decider,
                    reason: decision.reason.clone(),
                },
                approved_by: None,
            });
            record
        };
        work.results.push(record);

        let span = obs::run_span(&run.run_id.to_string(), &run.config.stage.to_string());
        Ok(self.drive(run, Some(work)).instrument(span).await)
    }

    async fn drive(&self, mut run: RunState, mut turn: Option<TurnWork>) -> AgentStep {
        loop {
            if let Some(mut work) = turn.take() {
                while let Some(call) = work.remaining.pop_front() {
                    match self.dispatch(&mut run, call).await {
                        Dispatch::Result(record) => work.results.push(record),
                        Dispatch::Suspend {
                            request,
                            description,
                        } => {
                            run.enter(AgentState::AwaitingApproval);
                            return AgentStep::Suspended(SuspendedRun {
                                run,
                                awaiting: request,
                                tool_description: description,
                                remaining: work.remaining.into_iter().collect(),
                                turn_results: work.results,
                                suspended_at: Utc::now(),
                            });
                        }
                    }
                }
                run.transcript
                    .push(ConversationTurn::tool_results(work.results));
                run.enter(AgentState::ToolExecuted);
            }

            if run.iterations >= run.config.max_iterations {
                let limit = run.config.max_iterations;
                return AgentStep::Finished(AgentOutcome::failed(
                    run,
                    AgentError::IterationLimitExceeded { limit },
                ));
            }
            run.iterations += 1;
            run.enter(AgentState::AwaitingModel);

            let response = match self.call_model(&run).await {
                Ok(response) => response,
                Err(err) => return AgentStep::Finished(AgentOutcome::failed(run, err)),
            };

            match response {
                ProviderResponse::Text { text } => {
                    obs::emit_model_turn(&run.run_id.to_string(), run.iterations, 0);
                    run.transcript.push(ConversationTurn::assistant(&text));
                    let output = if run.config.workflow_mode == WorkflowMode::ManualWithTips {
                        let tips =
                            synthesize_tips(run.config.stage, &run.input, &run.requested_calls());
                        format!("{text}\n\n{tips}")
                    } else {
                        text
                    };
                    return AgentStep::Finished(AgentOutcome::done(run, output));
                }
                ProviderResponse::ToolCalls { text, calls } => {
                    obs::emit_model_turn(&run.run_id.to_string(), run.iterations, calls.len());
                    run.transcript
                        .push(ConversationTurn::assistant_tool_calls(text, calls.clone()));
                    run.enter(AgentState::AwaitingToolExecution);

                    if run.config.workflow_mode == WorkflowMode::TipsOnly {
                        return AgentStep::Finished(advise(run, &calls));
                    }
                    turn = Some(TurnWork {
                        remaining: calls.into(),
                        results: Vec::new(),
                    });
                }
            }
        }
    }

    async fn dispatch(&self, run: &mut RunState, call: ToolCall) -> Dispatch {
        let request = ToolCallRequest::from_call(&call, run.origin(), Utc::now());

        let tool = match self.tools.get(&request.tool_name) {
            Ok(tool) if run.config.allows(&request.tool_name) => tool,
            _ => {
                let reason = format!("tool '{}' is not available to this agent", request.tool_name);
                obs::emit_tool_executed(&run.run_id.to_string(), &request.tool_name, "rejected", 0);
                let record = ToolResultRecord::error(&request.as_call(), reason.clone());
                run.invocations.push(ToolInvocation {
                    request,
                    outcome: InvocationOutcome::Rejected { reason },
                    approved_by: None,
                });
                return Dispatch::Result(record);
            }
        };

        if run.config.execution_mode.requires_approval(tool.spec()) {
            self.metrics.inc_approvals_requested();
            return Dispatch::Suspend {
                request,
                description: tool.spec().description.clone(),
            };
        }
        Dispatch::Result(self.execute(run, request, None, None).await)
    }

    /// Run one call through the registry and record it. `arguments`
    /// replaces the requested arguments when set.
    async fn execute(
        &self,
        run: &mut RunState,
        mut request: ToolCallRequest,
        arguments: Option<Value>,
        approved_by: Option<String>,
    ) -> ToolResultRecord {
        if let Some(arguments) = arguments {
            request.arguments = arguments;
        }
        let call = request.as_call();
        let run_id = run.run_id.to_string();

        match self.tools.execute(&request.tool_name, &request.arguments).await {
            Ok(report) => {
                self.metrics.inc_tool_executions();
                obs::emit_tool_executed(
                    &run_id,
                    &request.tool_name,
                    "executed",
                    report.duration_ms,
                );
                let record = ToolResultRecord::ok(&call, &report.output);
                run.invocations.push(ToolInvocation {
                    request,
                    outcome: InvocationOutcome::Executed {
                        output: report.output,
                        duration_ms: report.duration_ms,
                    },
                    approved_by,
                });
                record
            }
            Err(err) => {
                self.metrics.inc_tool_failures();
                obs::emit_tool_executed(&run_id, &request.tool_name, err.kind(), 0);
                let record = ToolResultRecord::error(&call, err.to_string());
                run.invocations.push(ToolInvocation {
                    request,
                    outcome: InvocationOutcome::Failed {
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    },
                    approved_by,
                });
                record
            }
        }
    }

    async fn call_model(&self, run: &RunState) -> AgentResult<ProviderResponse> {
        let tools = self
            .tools
            .specs_for(&run.config.allowed_tools)
            .map_err(|e| AgentError::configuration(e.to_string()))?;
        let request = ProviderRequest {
            transcript: run.transcript.clone(),
            tools,
            model: run.config.model.clone(),
            generation: run.config.generation,
        };

        let policy = run.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.send(&request).await {
                Ok(response) => {
                    self.metrics.inc_model_turns();
                    return Ok(response);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let backoff = policy.backoff_for(attempt);
                    self.metrics.inc_provider_retries();
                    obs::emit_provider_retry(
                        &run.run_id.to_string(),
                        attempt,
                        backoff.as_millis() as u64,
                        &err,
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(AgentError::from_provider(err, attempt)),
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("stage", &self.config.stage)
            .field("provider", &self.provider.name())
            .finish()
    }
}

fn compose_user_turn(config: &AgentConfig, input: &str, context: Option<&str>) -> String {
    let mut text = format!("## {} instructions\n{}", config.stage.title(), config.instructions);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        text.push_str("\n\n## Context from earlier stages\n");
        text.push_str(context);
    }
    text.push_str("\n\n## Input\n");
    text.push_str(input);
    text
}

/// Tips-only completion: record every requested call as advisory and answer
/// with synthesized tips.
fn advise(mut run: RunState, calls: &[ToolCall]) -> AgentOutcome {
    let origin = run.origin();
    let now = Utc::now();
    for call in calls {
        run.invocations.push(ToolInvocation {
            request: ToolCallRequest::from_call(call, origin.clone(), now),
            outcome: InvocationOutcome::Advisory,
            approved_by: None,
        });
    }
    let tips = synthesize_tips(run.config.stage, &run.input, calls);
    run.transcript.push(ConversationTurn::assistant(&tips));
    AgentOutcome::done(run, tips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Phase;

    #[test]
    fn user_turn_includes_context_only_when_present() {
        let config = AgentConfig::for_phase(Phase::Requirements);
        let with = compose_user_turn(&config, "build a login page", Some("users: 3 personas"));
        assert!(with.contains("## Context from earlier stages\nusers: 3 personas"));
        assert!(with.ends_with("## Input\nbuild a login page"));

        let without = compose_user_turn(&config, "build a login page", Some("   "));
        assert!(!without.contains("Context"));
    }

    #[test]
    fn agent_rejects_unregistered_allowed_tool() {
        let config = AgentConfig::for_phase(Phase::Testing).with_tools(["run_tests"]);
        let provider = Arc::new(crate::provider::ScriptedProvider::new("scripted", vec![]));
        let err = Agent::new(config, Arc::new(ToolRegistry::new()), provider).unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
}
