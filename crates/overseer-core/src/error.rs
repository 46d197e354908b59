//! Error types for the core data model and for agent implementations.

use thiserror::Error;

/// Errors raised while constructing or validating core values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An identifier failed validation.
    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: String,
    },

    /// A cron trigger named an interval that is not recognised.
    #[error(
        "Invalid schedule '{0}': expected a named interval such as 'hourly', 'daily' or 'every_15_minutes'"
    )]
    InvalidSchedule(String),

    /// Runtime limits are inconsistent.
    #[error("Invalid limits: {0}")]
    InvalidLimits(String),
}

impl CoreError {
    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            CoreError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            CoreError::InvalidLimits(_) => "INVALID_LIMITS",
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors an [`Agent`](crate::agent::Agent) may return from `run`.
///
/// The executor never propagates these to its caller: any `Err` becomes a
/// `failure` outcome on the invocation result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The agent attempted its work and failed.
    #[error("Agent failed: {0}")]
    Failed(String),

    /// The agent observed its cancellation token and gave up.
    #[error("Agent cancelled")]
    Cancelled,

    /// The payload or configuration was not usable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::Failed(_) => "AGENT_FAILED",
            AgentError::Cancelled => "AGENT_CANCELLED",
            AgentError::InvalidInput(_) => "AGENT_INVALID_INPUT",
            AgentError::Internal(_) => "AGENT_INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::InvalidInput(err.to_string())
    }
}
