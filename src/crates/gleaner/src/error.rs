//! Error types for the gleaner service.

use thiserror::Error;

/// Result type alias for gleaner operations.
pub type Result<T> = std::result::Result<T, GleanerError>;

/// Unified error type for the service.
#[derive(Debug, Error)]
pub enum GleanerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Agent output or input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A budget cap or envelope would be violated. Never retried.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Request denied by a circuit breaker.
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// Request denied by the rate limiter.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Blocked URL, tool, or content.
    #[error("Security violation: {0}")]
    Security(String),

    /// Chat transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model provider error.
    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    /// Graph domain error.
    #[error(transparent)]
    Kg(#[from] kg::KgError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// SQL error.
    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl GleanerError {
    /// Whether this error is a transient failure worth an in-call retry.
    /// Budget, validation, and security failures never are.
    pub fn is_transient(&self) -> bool {
        match self {
            GleanerError::Llm(e) => e.is_retryable(),
            GleanerError::Transport(msg) | GleanerError::Other(msg) => {
                tooling::retry::is_transient_message(msg)
            }
            _ => false,
        }
    }
}

impl From<anyhow::Error> for GleanerError {
    fn from(err: anyhow::Error) -> Self {
        GleanerError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_errors_not_transient() {
        assert!(!GleanerError::BudgetExceeded("cap".into()).is_transient());
        assert!(!GleanerError::Validation("bad".into()).is_transient());
        assert!(!GleanerError::Security("blocked".into()).is_transient());
    }

    #[test]
    fn test_transient_llm_errors() {
        assert!(GleanerError::Llm(llm::LlmError::Timeout("t".into())).is_transient());
        assert!(!GleanerError::Llm(llm::LlmError::Authentication("a".into())).is_transient());
    }

    #[test]
    fn test_transient_by_message() {
        assert!(GleanerError::Other("connection reset".into()).is_transient());
        assert!(!GleanerError::Other("nope".into()).is_transient());
    }
}
