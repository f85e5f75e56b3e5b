//! Phasewright Core Library
//!
//! Phase-gated LLM agents: a tool registry, a tool-calling agent loop with
//! human approval on sensitive calls, and an orchestrator that runs agents
//! over the software lifecycle or as a parallel design-build team.

pub mod agent;
pub mod approval;
pub mod bridge;
pub mod config;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod provider;
pub mod stage;
pub mod telemetry;
pub mod tools;
pub mod transcript;

pub use agent::{
    Agent, AgentConfig, AgentError, AgentOutcome, AgentResult, AgentState, AgentStep,
    ExecutionMode, InvocationOutcome, RetryPolicy, SuspendedRun, ToolInvocation, WorkflowMode,
};

pub use approval::{
    ApprovalDecision, ApprovalError, ApprovalGate, ApprovalPrompt, ApprovalStore, Approver,
    AutoApprover, FsApprovalStore, MemoryApprovalStore, PendingApproval, TimeoutApprover,
    Verdict,
};

pub use bridge::{
    BridgeError, BridgeOutcome, DocumentationSink, MemoryDocumentationSink, PageMapping,
    StatusBridge, StatusChangeEvent,
};

pub use config::{load_config, parse_config, ConfigError, OrchestratorConfig, StageOverride};

pub use metrics::{Metrics, MetricsSnapshot};

pub use orchestrator::{
    with_cancellation, CancelHandle, CancelSignal, Orchestrator, OrchestratorError,
    OrchestratorResult, PhaseResult, PhaseRun, Resolution, RunRecord, SequenceReport,
    SequenceStatus,
};

pub use provider::{
    AnthropicClient, GeminiClient, ProviderClient, ProviderError, ProviderRegistry,
    ProviderRequest, ProviderResponse, ScriptStep, ScriptedProvider,
};

pub use stage::{Phase, Role, Stage};

pub use telemetry::init_tracing;

pub use tools::{
    handler_fn, Tool, ToolCategory, ToolError, ToolHandler, ToolRegistry, ToolSchema, ToolSpec,
    ValidatedArgs,
};

pub use transcript::{ConversationTurn, ToolCall, ToolCallRequest};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
