//! Invocation hooks that record what they see, or fail on purpose.

use async_trait::async_trait;
use overseer_core::{InvocationOutcome, InvocationResult, RunId};
use overseer_runtime::{HookError, InvocationHooks, RunStarted};
use std::sync::Mutex;

/// Keeps every start and completion it is told about
#[derive(Debug, Default)]
pub struct RecordingHooks {
    started: Mutex<Vec<RunStarted>>,
    completed: Mutex<Vec<InvocationResult>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<RunStarted> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<InvocationResult> {
        self.completed.lock().unwrap().clone()
    }

    /// Outcomes of completed runs, in completion order
    pub fn outcomes(&self) -> Vec<InvocationOutcome> {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .map(|result| result.outcome)
            .collect()
    }

    /// Whether `run_id` both started and completed
    pub fn saw_full_run(&self, run_id: &RunId) -> bool {
        self.started
            .lock()
            .unwrap()
            .iter()
            .any(|run| &run.run_id == run_id)
            && self
                .completed
                .lock()
                .unwrap()
                .iter()
                .any(|result| &result.run_id == run_id)
    }
}

#[async_trait]
impl InvocationHooks for RecordingHooks {
    async fn on_start(&self, run: &RunStarted) -> Result<(), HookError> {
        self.started.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn on_complete(&self, result: &InvocationResult) -> Result<(), HookError> {
        self.completed.lock().unwrap().push(result.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum FailureMode {
    Error,
    Panic,
    Stall,
}

/// Fails every hook call with an error, a panic, or by never returning
#[derive(Debug, Clone, Copy)]
pub struct FailingHooks {
    mode: FailureMode,
}

impl FailingHooks {
    pub fn erroring() -> Self {
        Self {
            mode: FailureMode::Error,
        }
    }

    pub fn panicking() -> Self {
        Self {
            mode: FailureMode::Panic,
        }
    }

    /// Every call stays pending forever
    pub fn stalling() -> Self {
        Self {
            mode: FailureMode::Stall,
        }
    }

    async fn fail(&self, stage: &str) -> Result<(), HookError> {
        match self.mode {
            FailureMode::Error => Err(HookError(format!("{stage} hook failed on purpose"))),
            FailureMode::Panic => panic!("{stage} hook panicked on purpose"),
            FailureMode::Stall => std::future::pending().await,
        }
    }
}

#[async_trait]
impl InvocationHooks for FailingHooks {
    async fn on_start(&self, _run: &RunStarted) -> Result<(), HookError> {
        self.fail("on_start").await
    }

    async fn on_complete(&self, _result: &InvocationResult) -> Result<(), HookError> {
        self.fail("on_complete").await
    }
}
