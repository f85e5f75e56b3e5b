//! Error types for the orchestrator.
//!
//! Only misuse and misconfiguration surface here. Tool and model failures
//! during a run become `PhaseResult { success: false, .. }` instead.

use crate::agent::AgentError;
use crate::approval::ApprovalError;
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("provider '{name}' is not registered")]
    UnknownProvider { name: String },

    #[error("invalid stage range: {reason}")]
    InvalidRange { reason: String },

    #[error("approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Stable snake_case code used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Configuration(_) | OrchestratorError::Config(_) => "configuration",
            OrchestratorError::UnknownProvider { .. } => "unknown_provider",
            OrchestratorError::InvalidRange { .. } => "invalid_range",
            OrchestratorError::Approval(e) => e.kind(),
            OrchestratorError::Agent(e) => e.kind(),
            OrchestratorError::Cancelled => "cancelled",
        }
    }
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
