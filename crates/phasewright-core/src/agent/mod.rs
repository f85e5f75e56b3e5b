//! Agent execution loop with approval suspension.
//!
//! An [`Agent`] binds an [`AgentConfig`] to a provider and the tool
//! registry, then drives the conversation:
//!
//! ```text
//! Init → AwaitingModel → Done
//!                     ↘ AwaitingToolExecution → [AwaitingApproval] → ToolExecuted → AwaitingModel …
//!                                                                              (or Failed)
//! ```
//!
//! `AwaitingApproval` is the only suspension point. The loop hands back a
//! serializable [`SuspendedRun`] and `Agent::resume(suspended, decision)`
//! continues from it.
//!
//! # Module layout
//!
//! - [`config`]: `AgentConfig`, `ExecutionMode`, `WorkflowMode`, `RetryPolicy`
//! - [`state`]: `AgentState`, `RunState`, `SuspendedRun`, `AgentOutcome`, invocations
//! - [`runner`]: `Agent` and the loop itself
//! - [`advisory`]: tip synthesis for tips-only and manual-with-tips modes
//! - [`error`]: `AgentError`, `AgentResult`

pub mod advisory;
pub mod config;
pub mod error;
pub mod runner;
pub mod state;

pub use config::{
    AgentConfig, ExecutionMode, RetryPolicy, WorkflowMode, DEFAULT_MAX_ITERATIONS,
    DEFAULT_MODEL, DEFAULT_PROVIDER,
};
pub use error::{AgentError, AgentResult};
pub use runner::Agent;
pub use state::{
    AgentOutcome, AgentState, AgentStep, InvocationOutcome, RunState, SuspendedRun,
    ToolInvocation,
};
