//! Per-stage agent configuration and execution policies.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::GenerationConfig;
use crate::stage::{Phase, Role, Stage};
use crate::tools::ToolSpec;

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
pub const DEFAULT_PROVIDER: &str = "anthropic";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// How tool calls are cleared for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Every call runs immediately.
    Automated,
    /// Every call to an approval-flagged tool waits for a human.
    Manual,
    /// Only approval-flagged tools in the critical category wait.
    #[default]
    Hybrid,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Automated => "automated",
            ExecutionMode::Manual => "manual",
            ExecutionMode::Hybrid => "hybrid",
        }
    }

    /// Whether a call to `tool` must pass through the approval gate.
    pub fn requires_approval(&self, tool: &ToolSpec) -> bool {
        match self {
            ExecutionMode::Automated => false,
            ExecutionMode::Manual => tool.requires_approval,
            ExecutionMode::Hybrid => tool.requires_approval && tool.category.is_critical(),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automated" => Ok(ExecutionMode::Automated),
            "manual" => Ok(ExecutionMode::Manual),
            "hybrid" => Ok(ExecutionMode::Hybrid),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// What the agent is allowed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// Tools run; the agent changes things.
    #[default]
    WritesCode,
    /// Tools never run; requested calls become advice.
    TipsOnly,
    /// Tools run and the final answer is followed by advice.
    ManualWithTips,
}

impl WorkflowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowMode::WritesCode => "writes_code",
            WorkflowMode::TipsOnly => "tips_only",
            WorkflowMode::ManualWithTips => "manual_with_tips",
        }
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "writes_code" => Ok(WorkflowMode::WritesCode),
            "tips_only" => Ok(WorkflowMode::TipsOnly),
            "manual_with_tips" => Ok(WorkflowMode::ManualWithTips),
            other => Err(format!("unknown workflow mode: {other}")),
        }
    }
}

/// Bounded exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per model turn, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Everything an agent run needs besides the tools and provider themselves.
///
/// Runs take a snapshot of this at start; later edits never reach a run
/// already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub stage: Stage,
    pub system_prompt: String,
    pub instructions: String,
    pub allowed_tools: Vec<String>,
    pub provider: String,
    pub model: String,
    pub generation: GenerationConfig,
    pub execution_mode: ExecutionMode,
    pub workflow_mode: WorkflowMode,
    pub max_iterations: u32,
    pub retry: RetryPolicy,
}

impl AgentConfig {
    fn base(stage: Stage, system_prompt: &str, instructions: &str) -> Self {
        let name = match stage {
            Stage::Phase(p) => format!("{}-agent", p.as_str().replace('_', "-")),
            Stage::Role(r) => format!("{}-agent", r.as_str().replace('_', "-")),
        };
        Self {
            name,
            stage,
            system_prompt: system_prompt.to_string(),
            instructions: instructions.to_string(),
            allowed_tools: Vec::new(),
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::default(),
            execution_mode: ExecutionMode::default(),
            workflow_mode: WorkflowMode::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            retry: RetryPolicy::default(),
        }
    }

    /// Built-in defaults for a methodology phase.
    pub fn for_phase(phase: Phase) -> Self {
        let (prompt, instructions) = match phase {
            Phase::Discovery => (
                "You are the discovery agent. You map the problem space, stakeholders and existing systems.",
                "Summarize the goals, constraints and open questions. List what must be clarified before requirements are written.",
            ),
            Phase::Requirements => (
                "You are the requirements agent. You turn discovery notes into testable requirements.",
                "Produce functional and non-functional requirements with acceptance criteria. Flag conflicts.",
            ),
            Phase::Architecture => (
                "You are the architecture agent. You choose structure, boundaries and technology.",
                "Describe components, interfaces and data flow. Record each significant decision with its trade-offs.",
            ),
            Phase::DesignBuild => (
                "You are the design and build agent. You implement the agreed architecture.",
                "Make the smallest coherent change that satisfies the requirements. Keep the build green.",
            ),
            Phase::Testing => (
                "You are the testing agent. You verify behavior against requirements.",
                "Run the relevant suites, report failures with reproduction steps and propose fixes.",
            ),
            Phase::Deployment => (
                "You are the deployment agent. You ship verified builds safely.",
                "Prepare the release, describe the rollout and rollback plan, and confirm health checks.",
            ),
        };
        let mut config = Self::base(Stage::Phase(phase), prompt, instructions);
        if phase == Phase::Deployment {
            config.execution_mode = ExecutionMode::Manual;
        }
        config
    }

    /// Built-in defaults for a design/build team role.
    pub fn for_role(role: Role) -> Self {
        let (prompt, instructions) = match role {
            Role::DevLead => (
                "You are the development lead. You break work down and keep the team aligned.",
                "Split the input into tasks for frontend, backend and testing. Call out risks and sequencing.",
            ),
            Role::Frontend => (
                "You are the frontend developer. You build the user-facing surface.",
                "Implement the UI pieces of the plan. Keep components accessible and consistent.",
            ),
            Role::Backend => (
                "You are the backend developer. You build services, APIs and persistence.",
                "Implement the server-side pieces of the plan. Validate inputs and handle errors explicitly.",
            ),
            Role::AutomationTester => (
                "You are the automation tester. You write and run automated checks.",
                "Cover the new behavior with automated tests and report results.",
            ),
            Role::NfrTester => (
                "You are the non-functional tester. You assess performance, reliability and scalability.",
                "Identify hot paths and failure modes. Propose measurable targets and checks.",
            ),
            Role::PenTester => (
                "You are the penetration tester. You look for ways to break the system.",
                "Review the attack surface, authentication and input handling. Report findings by severity.",
            ),
        };
        let mut config = Self::base(Stage::Role(role), prompt, instructions);
        if role == Role::PenTester {
            config.workflow_mode = WorkflowMode::TipsOnly;
        }
        config
    }

    /// Default configuration for any stage.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Phase(p) => Self::for_phase(p),
            Stage::Role(r) => Self::for_role(r),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_workflow_mode(mut self, mode: WorkflowMode) -> Self {
        self.workflow_mode = mode;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool_name)
    }
}
