//! Error types for the registry, executor and scheduler.

use crate::store::StoreError;
use overseer_core::{AgentStatus, AgentType, CoreError, OwnerId, RegistrationId};
use thiserror::Error;

/// Errors surfaced to callers of the runtime.
///
/// Agent failures and timeouts are not errors at this level: they come back
/// as an [`InvocationResult`](overseer_core::InvocationResult) with a
/// `failure` or `timeout` outcome.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The owner already holds `limit` active or paused registrations.
    #[error("Owner '{owner}' has reached the limit of {limit} live agents")]
    OwnerQuotaExceeded { owner: OwnerId, limit: u32 },

    /// The parent already has `limit` children.
    #[error("Agent {parent_id} has reached the limit of {limit} children")]
    ChildQuotaExceeded {
        parent_id: RegistrationId,
        limit: u32,
    },

    /// The parent spawned too many children in the last hour.
    #[error("Agent {parent_id} may spawn at most {per_hour} children per hour")]
    SpawnRateLimited {
        parent_id: RegistrationId,
        per_hour: u32,
    },

    #[error("Registration not found: {0}")]
    RegistrationNotFound(RegistrationId),

    #[error("Registration {id} is {status}, not active")]
    RegistrationInactive {
        id: RegistrationId,
        status: AgentStatus,
    },

    /// Expiry has passed but the sweep has not flipped the status yet.
    #[error("Registration {0} has expired")]
    RegistrationExpired(RegistrationId),

    #[error("Registration {id} has used all {max} invocations")]
    InvocationBudgetExhausted { id: RegistrationId, max: u32 },

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(AgentType),

    /// The catalog knows the type but its factory refused the registration.
    #[error("Failed to construct agent of type {agent_type}: {reason}")]
    AgentConstruction { agent_type: AgentType, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Registration {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RegistrationId,
        from: AgentStatus,
        to: AgentStatus,
    },

    #[error("Registration {child_id} is not a child of {parent_id}")]
    NotAChild {
        parent_id: RegistrationId,
        child_id: RegistrationId,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl RuntimeError {
    /// Quota violations: the registration was never created.
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            RuntimeError::OwnerQuotaExceeded { .. }
                | RuntimeError::ChildQuotaExceeded { .. }
                | RuntimeError::SpawnRateLimited { .. }
        )
    }

    /// Invocation refused before the agent ran; no slot was consumed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RuntimeError::RegistrationNotFound(_)
                | RuntimeError::RegistrationInactive { .. }
                | RuntimeError::RegistrationExpired(_)
                | RuntimeError::InvocationBudgetExhausted { .. }
                | RuntimeError::UnknownAgentType(_)
                | RuntimeError::AgentConstruction { .. }
        )
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuntimeError::OwnerQuotaExceeded { .. } => "OWNER_QUOTA_EXCEEDED",
            RuntimeError::ChildQuotaExceeded { .. } => "CHILD_QUOTA_EXCEEDED",
            RuntimeError::SpawnRateLimited { .. } => "SPAWN_RATE_LIMITED",
            RuntimeError::RegistrationNotFound(_) => "REGISTRATION_NOT_FOUND",
            RuntimeError::RegistrationInactive { .. } => "REGISTRATION_INACTIVE",
            RuntimeError::RegistrationExpired(_) => "REGISTRATION_EXPIRED",
            RuntimeError::InvocationBudgetExhausted { .. } => "INVOCATION_BUDGET_EXHAUSTED",
            RuntimeError::UnknownAgentType(_) => "UNKNOWN_AGENT_TYPE",
            RuntimeError::AgentConstruction { .. } => "AGENT_CONSTRUCTION_FAILED",
            RuntimeError::InvalidInput(_) => "INVALID_INPUT",
            RuntimeError::InvalidTransition { .. } => "INVALID_TRANSITION",
            RuntimeError::NotAChild { .. } => "NOT_A_CHILD",
            RuntimeError::Store(_) => "STORE_ERROR",
            RuntimeError::Scheduler(_) => "SCHEDULER_ERROR",
        }
    }
}

impl From<CoreError> for RuntimeError {
    fn from(err: CoreError) -> Self {
        RuntimeError::InvalidInput(err.to_string())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::OwnerQuotaExceeded {
            owner: OwnerId::parse("u1").unwrap(),
            limit: 10,
        };
        assert_eq!(
            err.to_string(),
            "Owner 'u1' has reached the limit of 10 live agents"
        );
    }

    #[test]
    fn test_classification() {
        let id = RegistrationId::generate();
        assert!(
            RuntimeError::ChildQuotaExceeded {
                parent_id: id.clone(),
                limit: 5
            }
            .is_quota()
        );
        assert!(RuntimeError::RegistrationNotFound(id.clone()).is_rejection());
        assert!(
            RuntimeError::RegistrationInactive {
                id: id.clone(),
                status: AgentStatus::Stopped
            }
            .is_rejection()
        );
        assert!(!RuntimeError::Scheduler("x".to_string()).is_rejection());
        assert!(!RuntimeError::RegistrationExpired(id).is_quota());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            RuntimeError::UnknownAgentType(AgentType::parse("ghost").unwrap()).error_code(),
            "UNKNOWN_AGENT_TYPE"
        );
        let err: RuntimeError = CoreError::InvalidSchedule("sometimes".to_string()).into();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }
}
