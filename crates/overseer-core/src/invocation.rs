//! Invocation requests and results.

use crate::ConfigMap;
use crate::agent::TokenUsage;
use crate::identifiers::{RegistrationId, RunId};
use crate::registration::InvocationOutcome;
use crate::trigger::{Trigger, TriggeredBy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A request to invoke a registration once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub registration_id: RegistrationId,
    pub trigger: Trigger,
    /// Merged over the registration config; payload keys win.
    #[serde(default)]
    pub payload: ConfigMap,
}

impl InvocationRequest {
    pub fn new(registration_id: RegistrationId, trigger: Trigger) -> Self {
        Self {
            registration_id,
            trigger,
            payload: ConfigMap::new(),
        }
    }

    pub fn manual(registration_id: RegistrationId, invoked_by: impl Into<String>) -> Self {
        Self::new(registration_id, Trigger::manual(invoked_by))
    }

    pub fn with_payload(mut self, payload: ConfigMap) -> Self {
        self.payload = payload;
        self
    }
}

/// Progress of a cancellation the runtime has signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
    /// The token was signalled; the agent's task is still running.
    Requested,
    /// The agent's task has finished after the signal.
    Honored,
}

/// Normalized outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub run_id: RunId,
    pub registration_id: RegistrationId,
    pub triggered_by: TriggeredBy,
    pub outcome: InvocationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_ms", rename = "durationMs")]
    pub duration: Duration,
    pub llm_calls: usize,
    pub tokens_used: TokenUsage,
    /// Set when the runtime signalled cancellation for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancellationState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.outcome == InvocationOutcome::Success
    }
}

/// Serialize a `Duration` as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serializes_duration_in_millis() {
        let now = Utc::now();
        let result = InvocationResult {
            run_id: RunId::generate(),
            registration_id: RegistrationId::generate(),
            triggered_by: Trigger::manual("t").triggered_by(),
            outcome: InvocationOutcome::Timeout,
            result: None,
            error: Some("timed out".to_string()),
            duration: Duration::from_millis(1500),
            llm_calls: 0,
            tokens_used: TokenUsage::default(),
            cancellation: Some(CancellationState::Requested),
            started_at: now,
            finished_at: now,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["durationMs"], 1500);
        assert_eq!(value["outcome"], "timeout");
        assert_eq!(value["cancellation"], "requested");
        assert!(!result.is_success());

        let back: InvocationResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }

    #[test]
    fn manual_request() {
        let id = RegistrationId::generate();
        let request = InvocationRequest::manual(id.clone(), "alice");
        assert_eq!(request.registration_id, id);
        assert_eq!(request.trigger, Trigger::manual("alice"));
        assert!(request.payload.is_empty());
    }
}
