//! The orchestrator: builds agents per stage, sequences them and routes
//! approvals.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{OrchestratorError, OrchestratorResult};
use super::modes::ModeTable;
use super::result::{
    PhaseResult, PhaseRun, Resolution, RunRecord, SequenceReport, SequenceStatus,
};
use crate::agent::{
    Agent, AgentConfig, AgentOutcome, AgentStep, ExecutionMode, SuspendedRun, WorkflowMode,
};
use crate::approval::{
    ApprovalDecision, ApprovalError, ApprovalGate, ApprovalPrompt, Approver, PendingApproval,
};
use crate::config::OrchestratorConfig;
use crate::metrics::Metrics;
use crate::obs;
use crate::provider::ProviderRegistry;
use crate::stage::{Phase, Role, Stage};
use crate::tools::ToolRegistry;

/// A stage run after approvals have been routed as far as possible.
enum Settled {
    Completed(PhaseResult),
    Pending(PendingApproval),
}

/// What to do once a parked run finishes.
///
/// Sequences attach theirs to the approval record, so a process that did
/// not start the sequence can still finish it. A record without one is a
/// single-stage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Continuation {
    Single,
    Sequence {
        input: String,
        remaining: Vec<Stage>,
        completed: Vec<PhaseResult>,
    },
}

/// A request the gate has handed over, with everything needed to resume it.
struct Claimed {
    agent: Agent,
    run: SuspendedRun,
    continuation: Continuation,
}

#[derive(Debug, Clone, Copy)]
struct SequencePolicy {
    carry_context: bool,
    halt_on_failure: bool,
}

pub struct Orchestrator {
    phase_order: Vec<Phase>,
    policy: SequencePolicy,
    modes: ModeTable,
    tools: Arc<ToolRegistry>,
    providers: ProviderRegistry,
    gate: Arc<ApprovalGate>,
    approver: Option<Arc<dyn Approver>>,
    history: Mutex<Vec<RunRecord>>,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    /// Build an orchestrator over `tools` and `providers`.
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid, or any stage allows a tool that is not
    /// registered or names a provider that is not registered.
    pub fn new(
        config: OrchestratorConfig,
        tools: Arc<ToolRegistry>,
        providers: ProviderRegistry,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        let modes = ModeTable::from_config(&config);
        for stage_config in modes.iter() {
            check_stage(stage_config, &tools, &providers)?;
        }
        Ok(Self {
            phase_order: config.phase_order.clone(),
            policy: SequencePolicy {
                carry_context: config.carry_context,
                halt_on_failure: config.halt_on_failure,
            },
            modes,
            tools,
            providers,
            gate: Arc::new(ApprovalGate::in_memory()),
            approver: None,
            history: Mutex::new(Vec::new()),
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Park approvals in `gate` instead of a private in-memory one.
    pub fn with_gate(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Route every suspension to `approver` and wait for its decision.
    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn phase_order(&self) -> &[Phase] {
        &self.phase_order
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    pub fn agent_config(&self, stage: Stage) -> Option<&AgentConfig> {
        self.modes.get(stage)
    }

    // --- mode setters ---

    pub fn set_agent_mode(&mut self, phase: Phase, mode: ExecutionMode) {
        self.modes.set_execution_mode(Stage::Phase(phase), mode);
    }

    pub fn set_workflow_mode(&mut self, phase: Phase, mode: WorkflowMode) {
        self.modes.set_workflow_mode(Stage::Phase(phase), mode);
    }

    pub fn set_role_mode(&mut self, role: Role, mode: ExecutionMode) {
        self.modes.set_execution_mode(Stage::Role(role), mode);
    }

    pub fn set_role_workflow_mode(&mut self, role: Role, mode: WorkflowMode) {
        self.modes.set_workflow_mode(Stage::Role(role), mode);
    }

    /// Replace one stage's configuration wholesale.
    ///
    /// # Errors
    ///
    /// Rejects configs naming unregistered tools or providers.
    pub fn set_agent_config(&mut self, config: AgentConfig) -> OrchestratorResult<()> {
        check_stage(&config, &self.tools, &self.providers)?;
        self.modes.set(config);
        Ok(())
    }

    // --- runs ---

    /// Run one phase.
    ///
    /// Returns `PhaseRun::AwaitingApproval` when a gated call suspends the
    /// run and no approver is attached.
    pub async fn run_phase(&self, phase: Phase, input: &str) -> OrchestratorResult<PhaseRun> {
        self.run_stage(Stage::Phase(phase), input).await
    }

    /// Run one phase or role on its own.
    pub async fn run_stage(&self, stage: Stage, input: &str) -> OrchestratorResult<PhaseRun> {
        let step = self.start_stage(stage, input, None).await?;
        let settled = self.settle(step).await?;
        Ok(self.single(settled))
    }

    /// Resume the run parked under `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Approval` for unknown, mismatched,
    /// invalid or already resolved decisions, and `UnknownProvider` when
    /// the parked run's provider is not registered here. The request stays
    /// pending on every such error.
    pub async fn resolve_approval(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> OrchestratorResult<Resolution> {
        let claimed = self.claim(request_id, &decision)?;
        let step = self.resume_claimed(request_id, &claimed, &decision).await?;
        let settled = self.settle(step).await?;

        match claimed.continuation {
            Continuation::Single => Ok(Resolution::Phase(self.single(settled))),
            Continuation::Sequence {
                input,
                remaining,
                completed,
            } => {
                let report = self
                    .drive_sequence(input, remaining.into(), completed, Some(settled))
                    .await?;
                Ok(Resolution::Sequence(report))
            }
        }
    }

    /// Run phases from `start` to `end` inclusive in declared order.
    ///
    /// Either bound defaults to the corresponding end of the declared
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::InvalidRange` when a bound is not in the
    /// declared order or `start` comes after `end`.
    pub async fn run_workflow(
        &self,
        input: &str,
        start: Option<Phase>,
        end: Option<Phase>,
    ) -> OrchestratorResult<SequenceReport> {
        let stages = self.workflow_range(start, end)?;
        self.drive_sequence(input.to_string(), stages.into(), Vec::new(), None)
            .await
    }

    /// Run Design & Build team roles in the given order, or the full team
    /// in canonical order when `roles` is `None`.
    pub async fn run_design_build_team(
        &self,
        input: &str,
        roles: Option<&[Role]>,
    ) -> OrchestratorResult<SequenceReport> {
        let roles = roles.unwrap_or(&Role::ALL);
        if roles.is_empty() {
            return Err(OrchestratorError::InvalidRange {
                reason: "no roles selected".into(),
            });
        }
        let stages: VecDeque<Stage> = roles.iter().map(|&r| Stage::Role(r)).collect();
        self.drive_sequence(input.to_string(), stages, Vec::new(), None)
            .await
    }

    /// Outstanding approval prompts.
    pub fn pending_approvals(&self) -> OrchestratorResult<Vec<ApprovalPrompt>> {
        Ok(self.gate.pending()?)
    }

    /// Every finished stage run, oldest first.
    pub fn history(&self) -> Vec<RunRecord> {
        self.lock_history().clone()
    }

    // --- internals ---

    fn workflow_range(
        &self,
        start: Option<Phase>,
        end: Option<Phase>,
    ) -> OrchestratorResult<Vec<Stage>> {
        let position = |phase: Phase| {
            self.phase_order
                .iter()
                .position(|&p| p == phase)
                .ok_or_else(|| OrchestratorError::InvalidRange {
                    reason: format!("phase '{phase}' is not in the declared phase order"),
                })
        };
        let from = match start {
            Some(p) => position(p)?,
            None => 0,
        };
        let to = match end {
            Some(p) => position(p)?,
            None => self.phase_order.len().saturating_sub(1),
        };
        if from > to {
            return Err(OrchestratorError::InvalidRange {
                reason: format!(
                    "start phase '{}' comes after end phase '{}'",
                    self.phase_order[from], self.phase_order[to]
                ),
            });
        }
        Ok(self.phase_order[from..=to]
            .iter()
            .map(|&p| Stage::Phase(p))
            .collect())
    }

    /// Prepare the resume of `request_id`, then consume the request.
    ///
    /// Everything that can fail runs before the gate records the decision.
    fn claim(
        &self,
        request_id: &str,
        decision: &ApprovalDecision,
    ) -> OrchestratorResult<Claimed> {
        let record = self.gate.check(request_id, decision)?;
        let agent = self.agent_for(record.run.config().clone())?;
        let continuation = record
            .continuation::<Continuation>()
            .map_err(ApprovalError::from)?
            .unwrap_or(Continuation::Single);
        let run = self.gate.resolve(request_id, decision)?;
        Ok(Claimed {
            agent,
            run,
            continuation,
        })
    }

    async fn resume_claimed(
        &self,
        request_id: &str,
        claimed: &Claimed,
        decision: &ApprovalDecision,
    ) -> OrchestratorResult<AgentStep> {
        match claimed.agent.resume(&claimed.run, decision).await {
            Ok(step) => Ok(step),
            Err(err) => {
                self.gate.reopen(request_id)?;
                Err(err.into())
            }
        }
    }

    fn agent_for(&self, config: AgentConfig) -> OrchestratorResult<Agent> {
        let provider = self
            .providers
            .get(&config.provider)
            .ok_or_else(|| OrchestratorError::UnknownProvider {
                name: config.provider.clone(),
            })?;
        Ok(Agent::new(config, Arc::clone(&self.tools), provider)?
            .with_metrics(Arc::clone(&self.metrics)))
    }

    async fn start_stage(
        &self,
        stage: Stage,
        input: &str,
        context: Option<&str>,
    ) -> OrchestratorResult<AgentStep> {
        let config = self
            .modes
            .get(stage)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::Configuration(format!("no agent configured for {stage}"))
            })?;
        let agent = self.agent_for(config)?;
        Ok(agent.start(input, context).await)
    }

    /// Route suspensions to the approver (if any) until the run finishes,
    /// otherwise park the run in the gate.
    async fn settle(&self, mut step: AgentStep) -> OrchestratorResult<Settled> {
        loop {
            let suspended = match step {
                AgentStep::Finished(outcome) => {
                    return Ok(Settled::Completed(self.finish(outcome)))
                }
                AgentStep::Suspended(suspended) => suspended,
            };
            let pending = self.gate.submit(suspended)?;

            let Some(approver) = &self.approver else {
                return Ok(Settled::Pending(pending));
            };
            debug!(request_id = %pending.request_id, "routing approval to attached approver");
            let decision = approver.decide(&pending.prompt).await;
            let claimed = self.claim(&pending.request_id, &decision)?;
            step = self
                .resume_claimed(&pending.request_id, &claimed, &decision)
                .await?;
        }
    }

    fn finish(&self, outcome: AgentOutcome) -> PhaseResult {
        let now = Utc::now();
        let result = PhaseResult::from_outcome(outcome, now);
        obs::emit_phase_finished(
            &result.run_id.to_string(),
            &result.stage.to_string(),
            result.duration_ms,
            result.iterations,
            result.success,
        );
        self.lock_history().push(RunRecord::from_result(&result, now));
        result
    }

    fn single(&self, settled: Settled) -> PhaseRun {
        match settled {
            Settled::Completed(result) => PhaseRun::Completed(result),
            Settled::Pending(pending) => PhaseRun::AwaitingApproval(pending),
        }
    }

    /// Walk `remaining`, starting with an already settled stage if given.
    async fn drive_sequence(
        &self,
        input: String,
        mut remaining: VecDeque<Stage>,
        mut results: Vec<PhaseResult>,
        mut settled: Option<Settled>,
    ) -> OrchestratorResult<SequenceReport> {
        loop {
            match settled.take() {
                Some(Settled::Pending(pending)) => {
                    let status = SequenceStatus::AwaitingApproval {
                        stage: pending.prompt.origin.stage,
                        request_id: pending.request_id.clone(),
                    };
                    self.gate.attach(
                        &pending.request_id,
                        &Continuation::Sequence {
                            input,
                            remaining: remaining.into_iter().collect(),
                            completed: results.clone(),
                        },
                    )?;
                    return Ok(SequenceReport {
                        results,
                        status,
                        pending: Some(pending),
                    });
                }
                Some(Settled::Completed(result)) => {
                    let failed = !result.success;
                    let stage = result.stage;
                    let kind = result.error_kind().unwrap_or("unknown").to_string();
                    results.push(result);
                    if failed && self.policy.halt_on_failure {
                        obs::emit_workflow_halted(&stage.to_string(), &kind);
                        self.metrics.flush();
                        return Ok(SequenceReport {
                            results,
                            status: SequenceStatus::Halted { stage },
                            pending: None,
                        });
                    }
                }
                None => {}
            }

            let Some(stage) = remaining.pop_front() else {
                self.metrics.flush();
                return Ok(SequenceReport {
                    results,
                    status: SequenceStatus::Completed,
                    pending: None,
                });
            };
            let context = self.context_from(&results);
            let step = self.start_stage(stage, &input, context.as_deref()).await?;
            settled = Some(self.settle(step).await?);
        }
    }

    /// Prior successful outputs, labelled by stage, when context carrying
    /// is on.
    fn context_from(&self, results: &[PhaseResult]) -> Option<String> {
        if !self.policy.carry_context {
            return None;
        }
        let sections: Vec<String> = results
            .iter()
            .filter(|r| r.success && !r.output.trim().is_empty())
            .map(|r| format!("### {}\n{}", r.stage.title(), r.output.trim()))
            .collect();
        (!sections.is_empty()).then(|| sections.join("\n\n"))
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<RunRecord>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check_stage(
    config: &AgentConfig,
    tools: &ToolRegistry,
    providers: &ProviderRegistry,
) -> OrchestratorResult<()> {
    if providers.get(&config.provider).is_none() {
        return Err(OrchestratorError::UnknownProvider {
            name: config.provider.clone(),
        });
    }
    if let Some(missing) = config.allowed_tools.iter().find(|t| !tools.contains(t)) {
        return Err(OrchestratorError::Configuration(format!(
            "{}: allowed tool '{missing}' is not registered",
            config.stage
        )));
    }
    Ok(())
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase_order", &self.phase_order)
            .field("tools", &self.tools)
            .field("providers", &self.providers)
            .field("approver", &self.approver.is_some())
            .finish()
    }
}
