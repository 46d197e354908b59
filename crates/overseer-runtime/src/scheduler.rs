//! The scheduler: turns triggers into executor calls on a fixed cadence.
//!
//! Each tick runs three phases in order:
//!
//! 1. expiry sweep ([`Registry::check_expired`]),
//! 2. drain of every event emitted since the last tick, matched against the
//!    event triggers of active registrations,
//! 3. evaluation of cron triggers against the registry clock.
//!
//! Matches are dispatched onto a [`TaskTracker`] and never awaited by the
//! tick. Agent failures and timeouts from dispatched runs are logged and
//! dropped; only [`Scheduler::invoke`] hands a result back to a caller.

use crate::catalog::AgentCatalog;
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::{DEFAULT_CANCELLATION_RETENTION, Executor};
use crate::hooks::{DEFAULT_HOOK_TIMEOUT, InvocationHooks};
use crate::registry::Registry;
use crate::store::RegistrationStore;
use overseer_core::{
    AgentRegistration, AgentType, Clock, ConfigMap, InvocationRequest, InvocationResult, OwnerId,
    RegistrationId, RegistrationOptions, RunId, RuntimeLimits, Trigger,
};
use overseer_observability::RuntimeMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Default tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// An externally emitted event, buffered until the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: ConfigMap,
}

impl RuntimeEvent {
    pub fn new(event_type: impl Into<String>, data: ConfigMap) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Registrations flipped to `expired` by this tick's sweep.
    pub expired: Vec<RegistrationId>,
    pub events_processed: usize,
    pub event_dispatches: usize,
    pub cron_dispatches: usize,
}

impl TickReport {
    pub fn dispatched(&self) -> usize {
        self.event_dispatches + self.cron_dispatches
    }
}

struct TickLoop {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic driver over a [`Registry`] and an [`Executor`].
pub struct Scheduler {
    registry: Arc<Registry>,
    executor: Arc<Executor>,
    tick_interval: Duration,
    events_tx: mpsc::UnboundedSender<RuntimeEvent>,
    /// Held for a whole tick, so ticks never overlap.
    events_rx: Mutex<mpsc::UnboundedReceiver<RuntimeEvent>>,
    tick_loop: Mutex<Option<TickLoop>>,
    tracker: TaskTracker,
    /// Serializes [`Scheduler::wait_idle`] callers around the tracker's
    /// close and reopen.
    idle_gate: Mutex<()>,
    metrics: Option<Arc<RuntimeMetrics>>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, executor: Arc<Executor>, tick_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            executor,
            tick_interval,
            events_tx,
            events_rx: Mutex::new(events_rx),
            tick_loop: Mutex::new(None),
            tracker: TaskTracker::new(),
            idle_gate: Mutex::new(()),
            metrics: None,
        }
    }

    pub fn builder(catalog: AgentCatalog) -> SchedulerBuilder {
        SchedulerBuilder::new(catalog)
    }

    pub fn with_metrics(mut self, metrics: Arc<RuntimeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the periodic tick loop. The first tick runs one interval after
    /// start. Calling this while the loop is running does nothing.
    pub async fn start(self: &Arc<Self>) {
        let mut tick_loop = self.tick_loop.lock().await;
        if tick_loop
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            debug!("Scheduler already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(scheduler.run_loop(shutdown.clone()));
        *tick_loop = Some(TickLoop { shutdown, handle });
        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Scheduler started"
        );
    }

    /// Stop the tick loop and wait for it to exit. In-flight invocations
    /// keep running; use [`Self::wait_idle`] to await them.
    pub async fn stop(&self) {
        let Some(running) = self.tick_loop.lock().await.take() else {
            return;
        };
        running.shutdown.cancel();
        if let Err(e) = running.handle.await {
            error!(error = %e, "Scheduler loop ended abnormally");
        }
        info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.tick_loop
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.tick_interval;
        let mut ticker = tokio::time::interval_at(start, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, code = e.error_code(), "Scheduler tick failed");
                    }
                }
            }
        }
    }

    /// Wait until every dispatched invocation has finished. Concurrent
    /// callers wait one after another.
    pub async fn wait_idle(&self) {
        let _idle = self.idle_gate.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one tick now.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn tick(&self) -> RuntimeResult<TickReport> {
        let mut events = self.events_rx.lock().await;

        let expired = self.registry.check_expired().await?;

        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }

        let mut report = TickReport {
            expired,
            events_processed: drained.len(),
            ..Default::default()
        };

        if !drained.is_empty() {
            let active = self.registry.get_active().await?;
            for event in &drained {
                let mut matched = 0usize;
                for registration in &active {
                    for trigger in &registration.triggers {
                        if trigger.matches_event(&event.event_type, &event.data) {
                            self.dispatch(
                                InvocationRequest::new(registration.id.clone(), trigger.clone())
                                    .with_payload(event.data.clone()),
                            );
                            matched += 1;
                        }
                    }
                }
                debug!(event_type = %event.event_type, matched, "Processed event");
                report.event_dispatches += matched;
            }
        }

        let now = self.registry.now();
        for registration in self.registry.get_active().await? {
            report.cron_dispatches += self.fire_due_crons(&registration, now).await;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_tick(report.event_dispatches, report.cron_dispatches);
        }
        if report.dispatched() > 0 || !report.expired.is_empty() {
            info!(
                expired = report.expired.len(),
                events = report.events_processed,
                event_dispatches = report.event_dispatches,
                cron_dispatches = report.cron_dispatches,
                "Tick complete"
            );
        } else {
            debug!(events = report.events_processed, "Tick complete, nothing due");
        }
        Ok(report)
    }

    async fn fire_due_crons(
        &self,
        registration: &AgentRegistration,
        now: chrono::DateTime<chrono::Utc>,
    ) -> usize {
        let mut fired = 0;
        for (index, trigger) in registration.triggers.iter().enumerate() {
            let Trigger::Cron { schedule, last_run } = trigger else {
                continue;
            };
            if !schedule.is_due(*last_run, now) {
                continue;
            }
            // lastRun is written before dispatch so a slow run cannot fire twice.
            if let Err(e) = self
                .registry
                .mark_trigger_fired(&registration.id, index, now)
                .await
            {
                warn!(
                    registration_id = %registration.id,
                    error = %e,
                    "Could not mark cron trigger, skipping"
                );
                continue;
            }
            let fired_trigger = Trigger::Cron {
                schedule: *schedule,
                last_run: Some(now),
            };
            self.dispatch(InvocationRequest::new(
                registration.id.clone(),
                fired_trigger,
            ));
            fired += 1;
        }
        fired
    }

    fn dispatch(&self, request: InvocationRequest) {
        let executor = Arc::clone(&self.executor);
        debug!(
            registration_id = %request.registration_id,
            trigger = %request.trigger.kind(),
            "Dispatching invocation"
        );
        self.tracker.spawn(async move {
            let registration_id = request.registration_id.clone();
            match executor.invoke(request).await {
                Ok(_) => {}
                Err(e) if e.is_rejection() => {
                    debug!(registration_id = %registration_id, error = %e, "Dispatch skipped");
                }
                Err(e) => {
                    warn!(
                        registration_id = %registration_id,
                        error = %e,
                        code = e.error_code(),
                        "Dispatched invocation failed"
                    );
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Public surface
    // ------------------------------------------------------------------

    pub async fn register(
        &self,
        owner: OwnerId,
        agent_type: AgentType,
        options: RegistrationOptions,
    ) -> RuntimeResult<AgentRegistration> {
        self.registry.register(owner, agent_type, options).await
    }

    /// Manually invoke a registration and wait for the result.
    ///
    /// Errors if the registration does not exist or cannot run. Agent
    /// failures and timeouts are returned as results, not errors.
    pub async fn invoke(
        &self,
        id: &RegistrationId,
        payload: ConfigMap,
    ) -> RuntimeResult<InvocationResult> {
        let registration = self.registry.require(id).await?;
        self.executor
            .invoke(
                InvocationRequest::manual(registration.id, registration.owner.as_str())
                    .with_payload(payload),
            )
            .await
    }

    /// Invoke `child_id` on behalf of its parent run.
    pub async fn invoke_child(
        &self,
        parent_id: &RegistrationId,
        child_id: &RegistrationId,
        parent_run_id: RunId,
        payload: ConfigMap,
    ) -> RuntimeResult<InvocationResult> {
        let child = self.registry.require(child_id).await?;
        if child.parent_id.as_ref() != Some(parent_id) {
            return Err(RuntimeError::NotAChild {
                parent_id: parent_id.clone(),
                child_id: child_id.clone(),
            });
        }
        self.executor
            .invoke(
                InvocationRequest::new(
                    child.id,
                    Trigger::parent_agent(parent_id.clone(), parent_run_id),
                )
                .with_payload(payload),
            )
            .await
    }

    /// Queue an event for the next tick. Never blocks.
    pub fn emit(&self, event_type: impl Into<String>, data: ConfigMap) {
        let event = RuntimeEvent::new(event_type, data);
        debug!(event_type = %event.event_type, "Event queued");
        if self.events_tx.send(event).is_err() {
            warn!("Event queue closed, event dropped");
        }
    }

    pub async fn stop_agent(&self, id: &RegistrationId) -> RuntimeResult<bool> {
        self.registry.stop(id).await
    }

    pub async fn delete_agent(&self, id: &RegistrationId) -> RuntimeResult<bool> {
        self.registry.delete(id).await
    }

    pub fn cancel(&self, run_id: &RunId) -> bool {
        self.executor.cancel(run_id)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick_interval", &self.tick_interval)
            .field("registry", &self.registry)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// Wires a registry, executor and scheduler together.
pub struct SchedulerBuilder {
    catalog: AgentCatalog,
    limits: RuntimeLimits,
    tick_interval: Duration,
    cancellation_retention: usize,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn RegistrationStore>>,
    hooks: Vec<Arc<dyn InvocationHooks>>,
    hook_timeout: Duration,
    metrics: Option<Arc<RuntimeMetrics>>,
}

impl SchedulerBuilder {
    pub fn new(catalog: AgentCatalog) -> Self {
        Self {
            catalog,
            limits: RuntimeLimits::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            cancellation_retention: DEFAULT_CANCELLATION_RETENTION,
            clock: None,
            store: None,
            hooks: Vec::new(),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            metrics: None,
        }
    }

    pub fn limits(mut self, limits: RuntimeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Take limits, tick interval and retention from a loaded config.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.limits = config.limits;
        self.tick_interval = config.tick_interval;
        self.cancellation_retention = config.cancellation_retention;
        self
    }

    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn store(mut self, store: Arc<dyn RegistrationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn InvocationHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    pub fn metrics(mut self, metrics: Arc<RuntimeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> RuntimeResult<Arc<Scheduler>> {
        self.limits.validate()?;
        if self.tick_interval.is_zero() {
            return Err(RuntimeError::Scheduler(
                "tick interval must be positive".to_string(),
            ));
        }

        let mut registry = Registry::new(self.limits);
        if let Some(clock) = self.clock {
            registry = registry.with_clock(clock);
        }
        if let Some(store) = self.store {
            registry = registry.with_store(store);
        }
        if let Some(metrics) = &self.metrics {
            registry = registry.with_metrics(Arc::clone(metrics));
        }
        let registry = Arc::new(registry);

        let mut executor = Executor::new(Arc::clone(&registry), Arc::new(self.catalog))
            .with_cancellation_retention(self.cancellation_retention)
            .with_hook_timeout(self.hook_timeout);
        for hook in self.hooks {
            executor = executor.with_hooks(hook);
        }
        if let Some(metrics) = &self.metrics {
            executor = executor.with_metrics(Arc::clone(metrics));
        }

        let mut scheduler = Scheduler::new(registry, Arc::new(executor), self.tick_interval);
        if let Some(metrics) = self.metrics {
            scheduler = scheduler.with_metrics(metrics);
        }
        Ok(Arc::new(scheduler))
    }
}
