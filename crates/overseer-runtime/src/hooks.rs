//! Lifecycle hooks fired around each invocation.
//!
//! Hooks are for observation only. An `Err`, a panic or a call that outlives
//! the hook timeout is logged and otherwise ignored; it never changes the
//! invocation outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use overseer_core::{AgentType, InvocationResult, RegistrationId, RunId, TriggeredBy};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// How long a single hook call may run before it is abandoned.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Error a hook may return.
#[derive(Debug, Clone, Error)]
#[error("Hook failed: {0}")]
pub struct HookError(pub String);

/// Snapshot passed to [`InvocationHooks::on_start`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub run_id: RunId,
    pub registration_id: RegistrationId,
    pub agent_type: AgentType,
    pub triggered_by: TriggeredBy,
    pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait InvocationHooks: Send + Sync {
    async fn on_start(&self, _run: &RunStarted) -> Result<(), HookError> {
        Ok(())
    }

    async fn on_complete(&self, _result: &InvocationResult) -> Result<(), HookError> {
        Ok(())
    }
}

/// Runs every hook in order, isolating failures.
#[derive(Clone)]
pub(crate) struct HookSet {
    hooks: Vec<Arc<dyn InvocationHooks>>,
    timeout: Duration,
}

impl Default for HookSet {
    fn default() -> Self {
        Self {
            hooks: Vec::new(),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }
}

impl HookSet {
    pub(crate) fn push(&mut self, hook: Arc<dyn InvocationHooks>) {
        self.hooks.push(hook);
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    pub(crate) async fn start(&self, run: &RunStarted) {
        for hook in &self.hooks {
            self.guarded("on_start", &run.run_id, hook.on_start(run))
                .await;
        }
    }

    pub(crate) async fn complete(&self, result: &InvocationResult) {
        for hook in &self.hooks {
            self.guarded("on_complete", &result.run_id, hook.on_complete(result))
                .await;
        }
    }

    async fn guarded(
        &self,
        stage: &'static str,
        run_id: &RunId,
        call: impl Future<Output = Result<(), HookError>>,
    ) {
        match tokio::time::timeout(self.timeout, AssertUnwindSafe(call).catch_unwind()).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(run_id = %run_id, stage, error = %e, "Invocation hook failed"),
            Ok(Err(_)) => warn!(run_id = %run_id, stage, "Invocation hook panicked"),
            Err(_) => warn!(
                run_id = %run_id,
                stage,
                timeout_ms = self.timeout.as_millis() as u64,
                "Invocation hook timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_core::Trigger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl InvocationHooks for Counting {
        async fn on_start(&self, _run: &RunStarted) -> Result<(), HookError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Exploding;

    #[async_trait]
    impl InvocationHooks for Exploding {
        async fn on_start(&self, _run: &RunStarted) -> Result<(), HookError> {
            panic!("hook blew up");
        }
    }

    struct Refusing;

    #[async_trait]
    impl InvocationHooks for Refusing {
        async fn on_start(&self, _run: &RunStarted) -> Result<(), HookError> {
            Err(HookError("nope".to_string()))
        }
    }

    struct Stuck;

    #[async_trait]
    impl InvocationHooks for Stuck {
        async fn on_start(&self, _run: &RunStarted) -> Result<(), HookError> {
            std::future::pending().await
        }
    }

    fn run() -> RunStarted {
        RunStarted {
            run_id: RunId::generate(),
            registration_id: RegistrationId::generate(),
            agent_type: AgentType::parse("scout").unwrap(),
            triggered_by: Trigger::manual("t").triggered_by(),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failing_hooks_do_not_stop_later_hooks() {
        let counting = Arc::new(Counting::default());
        let mut hooks = HookSet::default();
        hooks.push(Arc::new(Exploding));
        hooks.push(Arc::new(Refusing));
        hooks.push(counting.clone());
        assert_eq!(hooks.len(), 3);

        hooks.start(&run()).await;
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_hook_is_abandoned_after_timeout() {
        let counting = Arc::new(Counting::default());
        let mut hooks = HookSet::default();
        hooks.set_timeout(Duration::from_millis(20));
        hooks.push(Arc::new(Stuck));
        hooks.push(counting.clone());

        hooks.start(&run()).await;
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }
}
