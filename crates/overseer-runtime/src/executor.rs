//! The executor: runs one invocation to completion or timeout.
//!
//! Every invocation follows the same path:
//!
//! 1. reserve a slot with [`Registry::admit`] (rejections consume nothing),
//! 2. resolve the agent from the [`AgentCatalog`],
//! 3. run the agent in its own task, racing it against the timeout and the
//!    run's cancellation token,
//! 4. normalize the result to `success`, `failure` or `timeout` and count it
//!    with [`Registry::record_invocation`].
//!
//! On timeout or [`Executor::cancel`] the token is signalled and the result
//! is returned straight away. The agent's task is never aborted; a watcher
//! records when it actually finishes (see [`CancellationState`]).
//!
//! Dropping an `invoke` future before it records its outcome signals the
//! run's token and hands the reserved slot back to the registry.

use crate::catalog::AgentCatalog;
use crate::error::{RuntimeError, RuntimeResult};
use crate::hooks::{HookSet, InvocationHooks, RunStarted};
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use overseer_core::{
    AgentContext, AgentError, AgentInput, AgentOutput, CancellationState, DecisionId,
    InvocationOutcome, InvocationRequest, InvocationResult, RegistrationId, RunId, TokenUsage,
};
use overseer_observability::RuntimeMetrics;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Honored cancellation records kept before pruning.
pub const DEFAULT_CANCELLATION_RETENTION: usize = 1024;

#[derive(Debug)]
struct RunningInvocation {
    registration_id: RegistrationId,
    token: CancellationToken,
    started_at: DateTime<Utc>,
}

/// Removes the run from the running table on every exit path.
struct RunningGuard {
    running: Arc<DashMap<RunId, RunningInvocation>>,
    run_id: RunId,
    metrics: Option<Arc<RuntimeMetrics>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.remove(&self.run_id);
        if let Some(metrics) = &self.metrics {
            metrics.invocation_finished();
        }
    }
}

/// An admitted slot. Dropped while armed, it signals the run's token and
/// returns the reservation from a spawned task.
struct SlotGuard {
    registry: Arc<Registry>,
    registration_id: RegistrationId,
    token: CancellationToken,
    armed: bool,
}

impl SlotGuard {
    /// The slot was consumed by `record_invocation`.
    fn disarm(mut self) {
        self.armed = false;
    }

    /// Return the slot now instead of on drop.
    async fn release(mut self) {
        if let Err(e) = self.registry.release(&self.registration_id).await {
            warn!(
                registration_id = %self.registration_id,
                error = %e,
                "Failed to release invocation slot"
            );
        }
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.token.cancel();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                registration_id = %self.registration_id,
                "Invocation dropped outside a runtime, slot not released"
            );
            return;
        };
        let registry = Arc::clone(&self.registry);
        let registration_id = self.registration_id.clone();
        handle.spawn(async move {
            match registry.release(&registration_id).await {
                Ok(()) => debug!(
                    registration_id = %registration_id,
                    "Released slot of dropped invocation"
                ),
                Err(e) => warn!(
                    registration_id = %registration_id,
                    error = %e,
                    "Failed to release invocation slot"
                ),
            }
        });
    }
}

enum Completion {
    Finished(Result<Result<AgentOutput, AgentError>, JoinError>),
    TimedOut,
    Cancelled,
}

struct Normalized {
    outcome: InvocationOutcome,
    result: Option<Value>,
    error: Option<String>,
    llm_calls: usize,
    tokens_used: TokenUsage,
}

impl Normalized {
    fn failed(error: String) -> Self {
        Self {
            outcome: InvocationOutcome::Failure,
            result: None,
            error: Some(error),
            llm_calls: 0,
            tokens_used: TokenUsage::default(),
        }
    }

    fn timed_out(error: String) -> Self {
        Self {
            outcome: InvocationOutcome::Timeout,
            ..Self::failed(error)
        }
    }
}

/// Executes invocations against the registry.
pub struct Executor {
    registry: Arc<Registry>,
    catalog: Arc<AgentCatalog>,
    hooks: HookSet,
    timeout: Duration,
    running: Arc<DashMap<RunId, RunningInvocation>>,
    cancellations: Arc<DashMap<RunId, CancellationState>>,
    cancellation_retention: usize,
    metrics: Option<Arc<RuntimeMetrics>>,
}

impl Executor {
    /// Executor using the registry's `invocationTimeoutMs`.
    pub fn new(registry: Arc<Registry>, catalog: Arc<AgentCatalog>) -> Self {
        let timeout = registry.limits().invocation_timeout();
        Self {
            registry,
            catalog,
            hooks: HookSet::default(),
            timeout,
            running: Arc::new(DashMap::new()),
            cancellations: Arc::new(DashMap::new()),
            cancellation_retention: DEFAULT_CANCELLATION_RETENTION,
            metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn InvocationHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    /// Limit on each hook call. Defaults to
    /// [`DEFAULT_HOOK_TIMEOUT`](crate::hooks::DEFAULT_HOOK_TIMEOUT).
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hooks.set_timeout(timeout);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RuntimeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cancellation_retention(mut self, retention: usize) -> Self {
        self.cancellation_retention = retention;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<AgentCatalog> {
        &self.catalog
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one invocation.
    ///
    /// Returns `Err` only when the invocation was refused before the agent
    /// ran (not found, inactive, expired, budget exhausted, unknown type) or
    /// on a store failure. Agent failures and timeouts come back as `Ok`
    /// with the matching outcome.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(registration_id = %request.registration_id, trigger = %request.trigger.kind())
    )]
    pub async fn invoke(&self, request: InvocationRequest) -> RuntimeResult<InvocationResult> {
        let registration = match self.registry.admit(&request.registration_id).await {
            Ok(registration) => registration,
            Err(e) => {
                self.record_rejection(&e);
                debug!(error = %e, code = e.error_code(), "Invocation rejected");
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        let slot = SlotGuard {
            registry: Arc::clone(&self.registry),
            registration_id: registration.id.clone(),
            token: token.clone(),
            armed: true,
        };

        let agent = match self.catalog.resolve(&registration) {
            Ok(agent) => agent,
            Err(e) => {
                slot.release().await;
                self.record_rejection(&e);
                warn!(error = %e, code = e.error_code(), "Agent could not be resolved");
                return Err(e);
            }
        };

        let run_id = RunId::generate();
        let started_at = self.registry.now();
        self.running.insert(
            run_id.clone(),
            RunningInvocation {
                registration_id: registration.id.clone(),
                token: token.clone(),
                started_at,
            },
        );
        if let Some(metrics) = &self.metrics {
            metrics.invocation_started();
        }
        let guard = RunningGuard {
            running: Arc::clone(&self.running),
            run_id: run_id.clone(),
            metrics: self.metrics.clone(),
        };

        let triggered_by = request.trigger.triggered_by();
        let mut payload = registration.config.clone();
        payload.extend(request.payload);
        let input = AgentInput {
            context: AgentContext {
                agent_id: registration.id.clone(),
                run_id: run_id.clone(),
                decision_id: DecisionId::generate(),
                triggered_by: triggered_by.clone(),
                cancellation: token.clone(),
            },
            payload,
        };

        self.hooks
            .start(&RunStarted {
                run_id: run_id.clone(),
                registration_id: registration.id.clone(),
                agent_type: registration.agent_type.clone(),
                triggered_by: triggered_by.clone(),
                started_at,
            })
            .await;
        debug!(run_id = %run_id, agent_type = %registration.agent_type, "Invocation started");

        let timer = Instant::now();
        let mut task = tokio::spawn(async move { agent.run(input).await });
        let completion = tokio::select! {
            biased;
            joined = &mut task => Completion::Finished(joined),
            _ = token.cancelled() => Completion::Cancelled,
            _ = tokio::time::sleep(self.timeout) => Completion::TimedOut,
        };
        let duration = timer.elapsed();

        let mut cancellation = None;
        let normalized = match completion {
            Completion::Finished(Ok(Ok(output))) => normalize_output(output),
            Completion::Finished(Ok(Err(e))) => Normalized::failed(e.to_string()),
            Completion::Finished(Err(join_err)) => Normalized::failed(if join_err.is_panic() {
                "agent panicked".to_string()
            } else {
                "agent task was aborted".to_string()
            }),
            Completion::TimedOut => {
                cancellation = Some(self.signal_cancellation(&run_id, &token, task));
                warn!(
                    run_id = %run_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Invocation timed out"
                );
                Normalized::timed_out(format!(
                    "invocation timed out after {}ms",
                    self.timeout.as_millis()
                ))
            }
            Completion::Cancelled => {
                cancellation = Some(self.signal_cancellation(&run_id, &token, task));
                info!(run_id = %run_id, "Invocation cancelled");
                Normalized::timed_out("invocation cancelled".to_string())
            }
        };

        match self
            .registry
            .record_invocation(&registration.id, normalized.outcome)
            .await
        {
            Ok(_) => slot.disarm(),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Failed to record invocation");
                slot.release().await;
            }
        }
        drop(guard);

        let result = InvocationResult {
            run_id,
            registration_id: registration.id,
            triggered_by,
            outcome: normalized.outcome,
            result: normalized.result,
            error: normalized.error,
            duration,
            llm_calls: normalized.llm_calls,
            tokens_used: normalized.tokens_used,
            cancellation,
            started_at,
            finished_at: self.registry.now(),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_invocation(result.outcome.as_str(), duration);
        }
        info!(
            run_id = %result.run_id,
            registration_id = %result.registration_id,
            outcome = %result.outcome,
            duration_ms = duration.as_millis() as u64,
            tokens_in = result.tokens_used.input,
            tokens_out = result.tokens_used.output,
            "Invocation finished"
        );

        self.hooks.complete(&result).await;
        Ok(result)
    }

    /// Signal the run's cancellation token. Returns `false` if the run is
    /// not in flight.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        match self.running.get(run_id) {
            Some(entry) => {
                entry.token.cancel();
                debug!(
                    run_id = %run_id,
                    registration_id = %entry.registration_id,
                    "Cancellation requested"
                );
                true
            }
            None => false,
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, run_id: &RunId) -> bool {
        self.running.contains_key(run_id)
    }

    /// Runs in flight with their registration and start time.
    pub fn running(&self) -> Vec<(RunId, RegistrationId, DateTime<Utc>)> {
        self.running
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.registration_id.clone(),
                    entry.started_at,
                )
            })
            .collect()
    }

    /// Whether a signalled run's agent has finished yet. `None` for runs
    /// that were never signalled or whose record was pruned.
    pub fn cancellation_state(&self, run_id: &RunId) -> Option<CancellationState> {
        self.cancellations.get(run_id).map(|state| *state)
    }

    fn signal_cancellation(
        &self,
        run_id: &RunId,
        token: &CancellationToken,
        task: tokio::task::JoinHandle<Result<AgentOutput, AgentError>>,
    ) -> CancellationState {
        token.cancel();
        self.cancellations
            .insert(run_id.clone(), CancellationState::Requested);
        if self.cancellations.len() > self.cancellation_retention {
            self.cancellations
                .retain(|_, state| *state == CancellationState::Requested);
        }

        let cancellations = Arc::clone(&self.cancellations);
        let run_id = run_id.clone();
        tokio::spawn(async move {
            let _ = task.await;
            if let Some(mut state) = cancellations.get_mut(&run_id) {
                *state = CancellationState::Honored;
            }
            debug!(run_id = %run_id, "Agent finished after cancellation");
        });
        CancellationState::Requested
    }

    fn record_rejection(&self, error: &RuntimeError) {
        if let Some(metrics) = &self.metrics {
            metrics.record_invocation_rejection(error.error_code());
        }
    }
}

fn normalize_output(output: AgentOutput) -> Normalized {
    let tokens_used = output.tokens_used();
    let llm_calls = output.llm_calls.len();
    if output.success {
        Normalized {
            outcome: InvocationOutcome::Success,
            result: output.result,
            error: None,
            llm_calls,
            tokens_used,
        }
    } else {
        Normalized {
            outcome: InvocationOutcome::Failure,
            result: output.result,
            error: Some(
                output
                    .error
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            ),
            llm_calls,
            tokens_used,
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("timeout", &self.timeout)
            .field("running", &self.running.len())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}
