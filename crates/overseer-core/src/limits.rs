//! Runtime limits and per-deployment overrides.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the invocation timeout.
pub const MAX_INVOCATION_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

/// Upper bound on the default lifetime, about a century.
pub const MAX_LIFETIME_DAYS: u32 = 36_500;

/// Quotas and defaults enforced by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeLimits {
    /// Registrations in `active` or `paused` a single owner may hold.
    pub max_agents_per_user: u32,
    /// Child slots per registration.
    pub max_children_per_agent: u32,
    /// Invocation budget for registrations that do not set their own.
    pub max_invocations_default: u32,
    /// Expiry horizon for registrations that do not set their own.
    pub max_lifetime_days: u32,
    /// Per-invocation timeout in milliseconds.
    pub invocation_timeout_ms: u64,
    /// Children a single parent may spawn per hour. `None` disables the check.
    pub spawn_rate_limit_per_hour: Option<u32>,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_agents_per_user: 10,
            max_children_per_agent: 5,
            max_invocations_default: 100,
            max_lifetime_days: 30,
            invocation_timeout_ms: 300_000,
            spawn_rate_limit_per_hour: Some(20),
        }
    }
}

impl RuntimeLimits {
    /// Defaults with `overrides` applied.
    pub fn merged(overrides: &LimitOverrides) -> Self {
        Self::default().apply(overrides)
    }

    /// Apply every field set in `overrides`. A spawn rate of `0` disables the
    /// spawn rate check.
    pub fn apply(mut self, overrides: &LimitOverrides) -> Self {
        if let Some(v) = overrides.max_agents_per_user {
            self.max_agents_per_user = v;
        }
        if let Some(v) = overrides.max_children_per_agent {
            self.max_children_per_agent = v;
        }
        if let Some(v) = overrides.max_invocations_default {
            self.max_invocations_default = v;
        }
        if let Some(v) = overrides.max_lifetime_days {
            self.max_lifetime_days = v;
        }
        if let Some(v) = overrides.invocation_timeout_ms {
            self.invocation_timeout_ms = v;
        }
        if let Some(v) = overrides.spawn_rate_limit_per_hour {
            self.spawn_rate_limit_per_hour = (v > 0).then_some(v);
        }
        self
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    /// Reject zero quotas and out-of-range timeouts.
    ///
    /// `max_children_per_agent` may be zero, which forbids children entirely.
    pub fn validate(&self) -> CoreResult<()> {
        let positive = [
            ("maxAgentsPerUser", u64::from(self.max_agents_per_user)),
            ("maxInvocationsDefault", u64::from(self.max_invocations_default)),
            ("maxLifetimeDays", u64::from(self.max_lifetime_days)),
            ("invocationTimeoutMs", self.invocation_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CoreError::InvalidLimits(format!("{name} must be positive")));
            }
        }
        if self.invocation_timeout_ms > MAX_INVOCATION_TIMEOUT_MS {
            return Err(CoreError::InvalidLimits(format!(
                "invocationTimeoutMs must be at most {MAX_INVOCATION_TIMEOUT_MS}"
            )));
        }
        if self.max_lifetime_days > MAX_LIFETIME_DAYS {
            return Err(CoreError::InvalidLimits(format!(
                "maxLifetimeDays must be at most {MAX_LIFETIME_DAYS}"
            )));
        }
        if self.spawn_rate_limit_per_hour == Some(0) {
            return Err(CoreError::InvalidLimits(
                "spawnRateLimitPerHour must be positive or unset".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial limits, e.g. from a fleet file or environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimitOverrides {
    pub max_agents_per_user: Option<u32>,
    pub max_children_per_agent: Option<u32>,
    pub max_invocations_default: Option<u32>,
    pub max_lifetime_days: Option<u32>,
    pub invocation_timeout_ms: Option<u64>,
    pub spawn_rate_limit_per_hour: Option<u32>,
}
