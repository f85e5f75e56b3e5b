//! Error types for provider clients.

/// Typed provider failures.
///
/// Only [`ProviderError::Unavailable`] is transient. Retrying is the agent's
/// job; clients never retry on their own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider '{provider}' unavailable: {message}")]
    Unavailable { provider: String, message: String },

    #[error("provider '{provider}' returned a malformed response: {message}")]
    Malformed { provider: String, message: String },

    #[error("provider '{provider}' rejected the request ({status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("provider '{provider}' is not configured: {message}")]
    NotConfigured { provider: String, message: String },
}

impl ProviderError {
    pub fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Whether a later attempt of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable { .. })
    }

    /// Classify a non-success HTTP status.
    ///
    /// 408, 429 and 5xx are transient; every other status is a rejection.
    pub fn from_status(provider: &str, status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 408 || status == 429 || (500..600).contains(&status) {
            Self::Unavailable {
                provider: provider.to_string(),
                message: format!("HTTP {status}: {message}"),
            }
        } else {
            Self::Rejected {
                provider: provider.to_string(),
                status,
                message,
            }
        }
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ProviderError::from_status("x", 429, "slow down").is_transient());
        assert!(ProviderError::from_status("x", 503, "down").is_transient());
        assert!(ProviderError::from_status("x", 408, "timeout").is_transient());
        assert!(matches!(
            ProviderError::from_status("x", 401, "bad key"),
            ProviderError::Rejected { status: 401, .. }
        ));
    }

    #[test]
    fn malformed_is_not_transient() {
        assert!(!ProviderError::malformed("x", "garbage").is_transient());
    }
}
