//! Error types for the agent execution loop.

use crate::provider::ProviderError;

/// Failures of an agent run.
///
/// `Configuration` and `ApprovalMismatch` are returned as `Err` from
/// construction and `resume`. The rest end a run and are carried in
/// [`AgentOutcome::error`](super::AgentOutcome).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("agent configuration error: {message}")]
    Configuration { message: String },

    #[error("provider unavailable after {attempts} attempt(s): {source}")]
    ProviderUnavailable {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("malformed model response: {0}")]
    MalformedResponse(#[source] ProviderError),

    #[error("provider rejected the request: {0}")]
    ProviderRejected(#[source] ProviderError),

    #[error("iteration limit of {limit} model turns exceeded")]
    IterationLimitExceeded { limit: u32 },

    #[error("decision for request '{actual}' does not match awaited request '{expected}'")]
    ApprovalMismatch { expected: String, actual: String },
}

impl AgentError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Classify a provider failure after `attempts` tries.
    pub fn from_provider(err: ProviderError, attempts: u32) -> Self {
        match err {
            ProviderError::Unavailable { .. } => Self::ProviderUnavailable {
                attempts,
                source: err,
            },
            ProviderError::Malformed { .. } => Self::MalformedResponse(err),
            ProviderError::Rejected { .. } => Self::ProviderRejected(err),
            ProviderError::NotConfigured { .. } => Self::Configuration {
                message: err.to_string(),
            },
        }
    }

    /// Stable snake_case code used in results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Configuration { .. } => "configuration",
            AgentError::ProviderUnavailable { .. } => "provider_unavailable",
            AgentError::MalformedResponse(_) => "malformed_response",
            AgentError::ProviderRejected(_) => "provider_rejected",
            AgentError::IterationLimitExceeded { .. } => "iteration_limit_exceeded",
            AgentError::ApprovalMismatch { .. } => "approval_mismatch",
        }
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
