//! # Mock Agents for Testing
//!
//! Agent implementations with scripted behaviour, so tests can drive the
//! executor through every outcome without a real model behind it.

use async_trait::async_trait;
use overseer_core::{Agent, AgentError, AgentInput, AgentOutput, LlmCall};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockBehavior {
    Succeed(Value),
    Fail(String),
    Error(AgentError),
}

/// An agent that returns a scripted result and records every call
#[derive(Debug, Clone)]
pub struct MockAgent {
    behavior: MockBehavior,
    delay: Option<Duration>,
    llm_calls: Vec<LlmCall>,
    call_count: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<AgentInput>>>,
}

impl MockAgent {
    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            llm_calls: Vec::new(),
            call_count: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns `success: true` with `result`
    pub fn succeeding(result: impl Into<Value>) -> Self {
        Self::with_behavior(MockBehavior::Succeed(result.into()))
    }

    /// Returns `success: false` with `error`
    pub fn failing(error: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Fail(error.into()))
    }

    /// Returns `Err(error)` from `run`
    pub fn erroring(error: AgentError) -> Self {
        Self::with_behavior(MockBehavior::Error(error))
    }

    /// Sleep before answering. Cancellation cuts the sleep short and the
    /// agent returns [`AgentError::Cancelled`].
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report an LLM call on every successful or failed output
    pub fn with_llm_call(mut self, call: LlmCall) -> Self {
        self.llm_calls.push(call);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Inputs received so far, oldest first
    pub fn inputs(&self) -> Vec<AgentInput> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn last_input(&self) -> Option<AgentInput> {
        self.inputs.lock().unwrap().last().cloned()
    }

    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.inputs.lock().unwrap().clear();
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn run(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = input.context.cancelled() => return Err(AgentError::Cancelled),
            }
        }

        let output = match &self.behavior {
            MockBehavior::Succeed(result) => AgentOutput::success(result.clone()),
            MockBehavior::Fail(error) => AgentOutput::failure(error.clone()),
            MockBehavior::Error(error) => return Err(error.clone()),
        };
        Ok(self
            .llm_calls
            .iter()
            .cloned()
            .fold(output, AgentOutput::with_llm_call))
    }
}

/// An agent that never returns, even after it sees cancellation
#[derive(Debug, Clone, Default)]
pub struct HangingAgent {
    started: Arc<AtomicUsize>,
    observed_cancellation: Arc<AtomicBool>,
}

impl HangingAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs that have started
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether any run saw its cancellation token fire
    pub fn observed_cancellation(&self) -> bool {
        self.observed_cancellation.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for HangingAgent {
    async fn run(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        input.context.cancelled().await;
        self.observed_cancellation.store(true, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// An agent that works for a while but stops as soon as it is cancelled
#[derive(Debug, Clone)]
pub struct CooperativeAgent {
    work: Duration,
    cancelled: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl CooperativeAgent {
    pub fn new(work: Duration) -> Self {
        Self {
            work,
            cancelled: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Runs that gave up because of cancellation
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Runs that finished their work
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for CooperativeAgent {
    async fn run(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        tokio::select! {
            _ = tokio::time::sleep(self.work) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                Ok(AgentOutput::success("done"))
            }
            _ = input.context.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(AgentError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_core::{
        AgentContext, ConfigMap, DecisionId, RegistrationId, RunId, TokenUsage, Trigger,
    };
    use tokio_util::sync::CancellationToken;

    fn input() -> AgentInput {
        AgentInput {
            context: AgentContext {
                agent_id: RegistrationId::generate(),
                run_id: RunId::generate(),
                decision_id: DecisionId::generate(),
                triggered_by: Trigger::manual("test").triggered_by(),
                cancellation: CancellationToken::new(),
            },
            payload: ConfigMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_agent_scripts() {
        let agent =
            MockAgent::succeeding("ok").with_llm_call(LlmCall::new("m", TokenUsage::new(1, 2)));
        let output = agent.run(input()).await.unwrap();
        assert!(output.success);
        assert_eq!(output.tokens_used(), TokenUsage::new(1, 2));
        assert_eq!(agent.call_count(), 1);

        let output = MockAgent::failing("nope").run(input()).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.error.as_deref(), Some("nope"));

        let err = MockAgent::erroring(AgentError::Internal("x".to_string()))
            .run(input())
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Internal("x".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_agent_stops_on_cancel() {
        let agent = CooperativeAgent::new(Duration::from_secs(60));
        let input = input();
        input.context.cancellation.cancel();
        let err = agent.run(input).await.unwrap_err();
        assert_eq!(err, AgentError::Cancelled);
        assert_eq!(agent.cancelled(), 1);
        assert_eq!(agent.completed(), 0);
    }
}
