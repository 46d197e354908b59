//! The contract between the runtime and agent implementations.
//!
//! An agent receives an [`AgentInput`] (identity, trigger and merged payload)
//! and returns an [`AgentOutput`]. Long-running agents should watch
//! [`AgentContext::cancelled`]: when the invocation times out or is cancelled
//! the runtime signals the token and stops waiting, but it never aborts the
//! agent's task.

use crate::ConfigMap;
use crate::error::AgentError;
use crate::identifiers::{DecisionId, RegistrationId, RunId};
use crate::trigger::TriggeredBy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::{Add, AddAssign};
use tokio_util::sync::CancellationToken;

/// An executable agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Perform one invocation.
    async fn run(&self, input: AgentInput) -> Result<AgentOutput, AgentError>;
}

/// Identity and trigger information for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    pub agent_id: RegistrationId,
    pub run_id: RunId,
    pub decision_id: DecisionId,
    pub triggered_by: TriggeredBy,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

impl AgentContext {
    /// Whether the runtime has given up on this invocation.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the runtime gives up on this invocation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// Everything an agent receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub context: AgentContext,
    /// Registration config overlaid with the invocation payload.
    pub payload: ConfigMap,
}

impl AgentInput {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Token counts for one or more LLM calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

/// Saturates at `u64::MAX`.
impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage {
            input: self.input.saturating_add(rhs.input),
            output: self.output.saturating_add(rhs.output),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

/// Record of an LLM call made during an invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub tokens: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl LlmCall {
    pub fn new(model: impl Into<String>, tokens: TokenUsage) -> Self {
        Self {
            model: Some(model.into()),
            tokens,
            latency_ms: None,
        }
    }
}

/// What an agent reports back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutput {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub llm_calls: Vec<LlmCall>,
}

impl AgentOutput {
    pub fn success(result: impl Into<Value>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            ..Default::default()
        }
    }

    /// An unsuccessful run the agent handled itself.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_llm_call(mut self, call: LlmCall) -> Self {
        self.llm_calls.push(call);
        self
    }

    /// Sum of tokens across every LLM call.
    pub fn tokens_used(&self) -> TokenUsage {
        self.llm_calls.iter().map(|call| call.tokens).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::Trigger;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn run(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
            if input.context.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            Ok(AgentOutput::success(Value::Object(input.payload)))
        }
    }

    fn input(payload: ConfigMap) -> AgentInput {
        AgentInput {
            context: AgentContext {
                agent_id: RegistrationId::generate(),
                run_id: RunId::generate(),
                decision_id: DecisionId::generate(),
                triggered_by: Trigger::manual("test").triggered_by(),
                cancellation: CancellationToken::new(),
            },
            payload,
        }
    }

    #[test]
    fn tokens_are_summed() {
        let output = AgentOutput::success("done")
            .with_llm_call(LlmCall::new("small", TokenUsage::new(10, 5)))
            .with_llm_call(LlmCall::new("large", TokenUsage::new(100, 50)));
        assert_eq!(output.tokens_used(), TokenUsage::new(110, 55));
        assert_eq!(output.tokens_used().total(), 165);
        assert_eq!(AgentOutput::failure("x").tokens_used(), TokenUsage::default());
    }

    #[test]
    fn token_sums_saturate() {
        let output = AgentOutput::success("done")
            .with_llm_call(LlmCall::new("a", TokenUsage::new(u64::MAX, 1)))
            .with_llm_call(LlmCall::new("b", TokenUsage::new(7, u64::MAX)));
        let used = output.tokens_used();
        assert_eq!(used, TokenUsage::new(u64::MAX, u64::MAX));
        assert_eq!(used.total(), u64::MAX);
    }

    #[test]
    fn agent_sees_payload_and_cancellation() {
        let mut payload = ConfigMap::new();
        payload.insert("topic".to_string(), Value::from("rust"));
        let input = input(payload);
        assert_eq!(input.get_str("topic"), Some("rust"));

        let output = tokio_test::block_on(Echo.run(input.clone())).unwrap();
        assert!(output.success);

        input.context.cancellation.cancel();
        let err = tokio_test::block_on(Echo.run(input)).unwrap_err();
        assert_eq!(err, AgentError::Cancelled);
    }

    #[test]
    fn context_serializes_without_token() {
        let value = serde_json::to_value(input(ConfigMap::new()).context).unwrap();
        assert!(value.get("cancellation").is_none());
        assert_eq!(value["triggeredBy"]["type"], "manual");
    }
}
