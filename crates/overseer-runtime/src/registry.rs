//! The registry: sole source of truth for registrations.
//!
//! Every mutation goes through a single async write gate, so the cross-record
//! invariants hold under concurrent callers:
//!
//! - an owner never holds more than `maxAgentsPerUser` live registrations,
//! - a parent never has more than `maxChildren` children,
//! - `invocationCount` never exceeds `maxInvocations`, and reaching it flips
//!   the status to `stopped` in the same write.
//!
//! Reads go straight to the store and return snapshots.

use crate::error::{RuntimeError, RuntimeResult};
use crate::rate_limit::SpawnRateLimiter;
use crate::store::{InMemoryRegistrationStore, RegistrationStore};
use chrono::{DateTime, Utc};
use overseer_core::{
    AgentRegistration, AgentStatus, AgentType, Clock, InvocationOutcome, OwnerId,
    RegistrationId, RegistrationOptions, RuntimeLimits, StopCondition, SystemClock, Trigger,
};
use overseer_observability::RuntimeMetrics;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Registry of agent registrations.
pub struct Registry {
    store: Arc<dyn RegistrationStore>,
    limits: RuntimeLimits,
    clock: Arc<dyn Clock>,
    spawn_limiter: Option<SpawnRateLimiter>,
    metrics: Option<Arc<RuntimeMetrics>>,
    write_gate: Mutex<()>,
}

impl Registry {
    /// Registry over an in-memory store and the system clock.
    pub fn new(limits: RuntimeLimits) -> Self {
        let spawn_limiter = limits
            .spawn_rate_limit_per_hour
            .and_then(SpawnRateLimiter::new);
        Self {
            store: InMemoryRegistrationStore::shared(),
            limits,
            clock: Arc::new(SystemClock),
            spawn_limiter,
            metrics: None,
            write_gate: Mutex::new(()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RegistrationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RuntimeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Effective limits.
    pub fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Create a registration.
    ///
    /// The owner quota is checked first. With a parent, the parent must be
    /// live, have a free child slot and be within its spawn rate; the child
    /// id is appended to the parent in the same critical section, so a
    /// failure leaves nothing behind.
    #[tracing::instrument(level = "debug", skip_all, fields(owner = %owner, agent_type = %agent_type))]
    pub async fn register(
        &self,
        owner: OwnerId,
        agent_type: AgentType,
        options: RegistrationOptions,
    ) -> RuntimeResult<AgentRegistration> {
        let _gate = self.write_gate.lock().await;

        let live = self
            .store
            .list_by_owner(&owner)
            .await?
            .iter()
            .filter(|r| r.status.is_live())
            .count();
        if live as u64 >= u64::from(self.limits.max_agents_per_user) {
            warn!(
                owner = %owner,
                limit = self.limits.max_agents_per_user,
                "Owner quota exceeded"
            );
            self.record_quota_rejection("owner");
            return Err(RuntimeError::OwnerQuotaExceeded {
                owner,
                limit: self.limits.max_agents_per_user,
            });
        }

        validate_options(&options)?;

        let parent = match &options.parent_id {
            Some(parent_id) => Some(self.check_parent(parent_id).await?),
            None => None,
        };

        let now = self.clock.now();
        let expires_at = options
            .effective_expires_at(now, self.limits.max_lifetime_days)
            .ok_or_else(|| {
                RuntimeError::InvalidInput("expiresInDays is out of range".to_string())
            })?;
        let max_children = options
            .max_children
            .map_or(self.limits.max_children_per_agent, |m| {
                m.min(self.limits.max_children_per_agent)
            });
        let registration = AgentRegistration {
            id: RegistrationId::generate(),
            owner,
            parent_id: options.parent_id.clone(),
            agent_type,
            max_invocations: options
                .effective_max_invocations(self.limits.max_invocations_default),
            expires_at: Some(expires_at),
            config: options.config,
            triggers: options.triggers,
            stop_conditions: options.stop_conditions,
            created_at: now,
            status: AgentStatus::Active,
            invocation_count: 0,
            in_flight: 0,
            max_children,
            children: Vec::new(),
            last_invoked_at: None,
            last_result: None,
        };

        self.store.insert(registration.clone()).await?;

        if let Some(mut parent) = parent {
            parent.children.push(registration.id.clone());
            if let Err(e) = self.store.replace(parent).await {
                // Roll back so no orphan is left behind.
                self.store.remove(&registration.id).await?;
                return Err(e.into());
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_registration();
        }
        info!(
            registration_id = %registration.id,
            owner = %registration.owner,
            agent_type = %registration.agent_type,
            parent_id = ?registration.parent_id.as_ref().map(|p| p.as_str()),
            max_invocations = registration.max_invocations,
            "Registered agent"
        );
        Ok(registration)
    }

    async fn check_parent(&self, parent_id: &RegistrationId) -> RuntimeResult<AgentRegistration> {
        let parent = self
            .store
            .get(parent_id)
            .await?
            .ok_or_else(|| RuntimeError::RegistrationNotFound(parent_id.clone()))?;

        if parent.status.is_terminal() {
            return Err(RuntimeError::RegistrationInactive {
                id: parent.id,
                status: parent.status,
            });
        }

        if !parent.has_child_capacity() {
            warn!(
                parent_id = %parent.id,
                limit = parent.max_children,
                "Child quota exceeded"
            );
            self.record_quota_rejection("children");
            return Err(RuntimeError::ChildQuotaExceeded {
                parent_id: parent.id,
                limit: parent.max_children,
            });
        }

        if let Some(limiter) = &self.spawn_limiter
            && let Err(retry_after) = limiter.check(&parent.id)
        {
            warn!(
                parent_id = %parent.id,
                per_hour = limiter.per_hour(),
                retry_after_secs = retry_after.as_secs(),
                "Spawn rate limited"
            );
            self.record_quota_rejection("spawn_rate");
            return Err(RuntimeError::SpawnRateLimited {
                parent_id: parent.id,
                per_hour: limiter.per_hour(),
            });
        }

        Ok(parent)
    }

    fn record_quota_rejection(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_quota_rejection(kind);
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get(&self, id: &RegistrationId) -> RuntimeResult<Option<AgentRegistration>> {
        Ok(self.store.get(id).await?)
    }

    /// Like [`Self::get`], but a missing id is an error.
    pub async fn require(&self, id: &RegistrationId) -> RuntimeResult<AgentRegistration> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| RuntimeError::RegistrationNotFound(id.clone()))
    }

    pub async fn get_by_owner(&self, owner: &OwnerId) -> RuntimeResult<Vec<AgentRegistration>> {
        Ok(self.store.list_by_owner(owner).await?)
    }

    /// Registrations whose status is `active`.
    pub async fn get_active(&self) -> RuntimeResult<Vec<AgentRegistration>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(AgentRegistration::is_active)
            .collect())
    }

    pub async fn list(&self) -> RuntimeResult<Vec<AgentRegistration>> {
        Ok(self.store.list().await?)
    }

    pub async fn len(&self) -> RuntimeResult<usize> {
        Ok(self.store.len().await?)
    }

    pub async fn is_empty(&self) -> RuntimeResult<bool> {
        Ok(self.store.is_empty().await?)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Move a registration to `status`.
    ///
    /// Writing the current status is a no-op. Anything else must be a
    /// forward transition (see [`AgentStatus::can_transition_to`]).
    pub async fn update_status(
        &self,
        id: &RegistrationId,
        status: AgentStatus,
    ) -> RuntimeResult<AgentRegistration> {
        let _gate = self.write_gate.lock().await;
        let mut registration = self.require(id).await?;

        if registration.status == status {
            return Ok(registration);
        }
        if !registration.status.can_transition_to(status) {
            return Err(RuntimeError::InvalidTransition {
                id: id.clone(),
                from: registration.status,
                to: status,
            });
        }

        let from = registration.status;
        registration.status = status;
        self.store.replace(registration.clone()).await?;
        info!(registration_id = %id, %from, to = %status, "Status changed");
        Ok(registration)
    }

    /// Stop a live registration and every live descendant, depth first.
    ///
    /// Returns `false` (and stops nothing) when the registration is already
    /// terminal.
    #[tracing::instrument(level = "debug", skip(self), fields(registration_id = %id))]
    pub async fn stop(&self, id: &RegistrationId) -> RuntimeResult<bool> {
        let _gate = self.write_gate.lock().await;
        let root = self.require(id).await?;
        if root.status.is_terminal() {
            return Ok(false);
        }

        let mut stack = vec![root];
        let mut stopped = 0usize;
        while let Some(mut registration) = stack.pop() {
            // Children are pushed in reverse so the first child is visited first.
            for child_id in registration.children.iter().rev() {
                if let Some(child) = self.store.get(child_id).await? {
                    stack.push(child);
                }
            }
            if registration.status.is_live() {
                registration.status = AgentStatus::Stopped;
                self.store.replace(registration).await?;
                stopped += 1;
            }
        }

        info!(registration_id = %id, stopped, "Stopped agent and descendants");
        Ok(true)
    }

    /// Delete a registration and all of its descendants.
    ///
    /// Descendants are removed before their ancestors. The id is also
    /// detached from its parent's children, which frees the parent's slot.
    #[tracing::instrument(level = "debug", skip(self), fields(registration_id = %id))]
    pub async fn delete(&self, id: &RegistrationId) -> RuntimeResult<bool> {
        let _gate = self.write_gate.lock().await;
        let Some(root) = self.store.get(id).await? else {
            return Ok(false);
        };

        // Pre-order collection, removed in reverse (post-order).
        let mut order = Vec::new();
        let mut stack = vec![root.id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(registration) = self.store.get(&current).await? {
                stack.extend(registration.children.iter().rev().cloned());
                order.push(current);
            }
        }
        for descendant in order.iter().rev() {
            self.store.remove(descendant).await?;
        }

        if let Some(parent_id) = &root.parent_id
            && let Some(mut parent) = self.store.get(parent_id).await?
        {
            parent.children.retain(|child| child != id);
            self.store.replace(parent).await?;
        }

        info!(registration_id = %id, removed = order.len(), "Deleted agent and descendants");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Invocation bookkeeping
    // ------------------------------------------------------------------

    /// Reserve an invocation slot.
    ///
    /// Succeeds only for an `active`, unexpired registration with budget left
    /// after counting other in-flight invocations. The reservation is
    /// consumed by [`Self::record_invocation`] or returned by
    /// [`Self::release`].
    pub async fn admit(&self, id: &RegistrationId) -> RuntimeResult<AgentRegistration> {
        let _gate = self.write_gate.lock().await;
        let mut registration = self.require(id).await?;

        if registration.status != AgentStatus::Active {
            return Err(RuntimeError::RegistrationInactive {
                id: id.clone(),
                status: registration.status,
            });
        }
        if registration.is_expired_at(self.clock.now()) {
            return Err(RuntimeError::RegistrationExpired(id.clone()));
        }
        if registration.remaining_invocations() == 0 {
            return Err(RuntimeError::InvocationBudgetExhausted {
                id: id.clone(),
                max: registration.max_invocations,
            });
        }

        registration.in_flight += 1;
        self.store.replace(registration.clone()).await?;
        debug!(registration_id = %id, in_flight = registration.in_flight, "Admitted invocation");
        Ok(registration)
    }

    /// Return a reservation that never reached the agent.
    pub async fn release(&self, id: &RegistrationId) -> RuntimeResult<()> {
        let _gate = self.write_gate.lock().await;
        if let Some(mut registration) = self.store.get(id).await? {
            registration.in_flight = registration.in_flight.saturating_sub(1);
            self.store.replace(registration).await?;
        }
        Ok(())
    }

    /// Count one finished invocation.
    ///
    /// Consumes an in-flight reservation if there is one. When the count
    /// reaches `maxInvocations` a live registration becomes `stopped` in the
    /// same write.
    pub async fn record_invocation(
        &self,
        id: &RegistrationId,
        outcome: InvocationOutcome,
    ) -> RuntimeResult<AgentRegistration> {
        let _gate = self.write_gate.lock().await;
        let mut registration = self.require(id).await?;

        if registration.invocation_count >= registration.max_invocations {
            return Err(RuntimeError::InvocationBudgetExhausted {
                id: id.clone(),
                max: registration.max_invocations,
            });
        }

        registration.invocation_count += 1;
        registration.in_flight = registration.in_flight.saturating_sub(1);
        registration.last_invoked_at = Some(self.clock.now());
        registration.last_result = Some(outcome);

        let exhausted = registration.invocation_count == registration.max_invocations;
        if exhausted && registration.status.is_live() {
            registration.status = AgentStatus::Stopped;
        }
        self.store.replace(registration.clone()).await?;

        debug!(
            registration_id = %id,
            %outcome,
            count = registration.invocation_count,
            max = registration.max_invocations,
            "Recorded invocation"
        );
        if exhausted {
            info!(registration_id = %id, "Invocation budget exhausted, agent stopped");
        }
        Ok(registration)
    }

    /// Set `lastRun` on the cron trigger at `index`.
    pub async fn mark_trigger_fired(
        &self,
        id: &RegistrationId,
        index: usize,
        at: DateTime<Utc>,
    ) -> RuntimeResult<()> {
        let _gate = self.write_gate.lock().await;
        let mut registration = self.require(id).await?;
        match registration.triggers.get_mut(index) {
            Some(Trigger::Cron { last_run, .. }) => *last_run = Some(at),
            _ => {
                return Err(RuntimeError::InvalidInput(format!(
                    "trigger {index} of {id} is not a cron trigger"
                )));
            }
        }
        self.store.replace(registration).await?;
        Ok(())
    }

    /// Flip every `active` registration whose expiry has passed to
    /// `expired`. Returns the flipped ids.
    pub async fn check_expired(&self) -> RuntimeResult<Vec<RegistrationId>> {
        let _gate = self.write_gate.lock().await;
        let now = self.clock.now();

        let mut flipped = Vec::new();
        for mut registration in self.store.list().await? {
            if registration.status == AgentStatus::Active && registration.is_expired_at(now) {
                registration.status = AgentStatus::Expired;
                flipped.push(registration.id.clone());
                self.store.replace(registration).await?;
            }
        }

        if !flipped.is_empty() {
            info!(count = flipped.len(), "Expired agents");
            if let Some(metrics) = &self.metrics {
                metrics.record_expired(flipped.len());
            }
        }
        if let Some(limiter) = &self.spawn_limiter {
            limiter.shrink();
        }
        Ok(flipped)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("limits", &self.limits)
            .field("clock", &self.clock)
            .field("spawn_limiter", &self.spawn_limiter)
            .finish_non_exhaustive()
    }
}

fn validate_options(options: &RegistrationOptions) -> RuntimeResult<()> {
    if options.max_invocations == Some(0) {
        return Err(RuntimeError::InvalidInput(
            "maxInvocations must be positive".to_string(),
        ));
    }
    if options
        .stop_conditions
        .iter()
        .any(|c| matches!(c, StopCondition::MaxInvocations { count: 0 }))
    {
        return Err(RuntimeError::InvalidInput(
            "max_invocations stop condition needs a positive count".to_string(),
        ));
    }
    if options.expires_in_days == Some(0) {
        return Err(RuntimeError::InvalidInput(
            "expiresInDays must be positive".to_string(),
        ));
    }
    for trigger in &options.triggers {
        if let Trigger::Event { event_type, .. } = trigger
            && event_type.trim().is_empty()
        {
            return Err(RuntimeError::InvalidInput(
                "event triggers need a non-empty eventType".to_string(),
            ));
        }
    }
    Ok(())
}
