//! Built-in demo agents used by `overseer simulate`.

use async_trait::async_trait;
use overseer::{
    Agent, AgentCatalog, AgentError, AgentInput, AgentOutput, AgentType, CoreError, LlmCall,
    TokenUsage,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Echoes its payload and trigger back.
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn run(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        let tokens = input.payload.len() as u64;
        Ok(AgentOutput::success(json!({
            "agentId": input.context.agent_id,
            "triggeredBy": input.context.triggered_by,
            "payload": Value::Object(input.payload),
        }))
        .with_llm_call(LlmCall::new("echo", TokenUsage::new(tokens, tokens))))
    }
}

/// Fails every other run, alternating with success.
#[derive(Default)]
pub struct FlakyAgent {
    runs: AtomicU64,
}

#[async_trait]
impl Agent for FlakyAgent {
    async fn run(&self, _input: AgentInput) -> Result<AgentOutput, AgentError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        if run % 2 == 1 {
            return Err(AgentError::Failed(format!("flaky run {run} failed")));
        }
        Ok(AgentOutput::success(json!({ "run": run })))
    }
}

pub fn demo_catalog() -> Result<AgentCatalog, CoreError> {
    Ok(AgentCatalog::new()
        .with_agent(AgentType::parse("echo")?, Arc::new(EchoAgent))
        .with_agent(AgentType::parse("flaky")?, Arc::new(FlakyAgent::default())))
}
