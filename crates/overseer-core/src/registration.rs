//! Agent registrations and their lifecycle.

use crate::ConfigMap;
use crate::identifiers::{AgentType, OwnerId, RegistrationId};
use crate::trigger::Trigger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a registration.
///
/// Transitions only move forward:
///
/// ```text
/// active ──► paused ──► stopped
///    │          └─────► expired
///    ├────────────────► stopped
///    └────────────────► expired
/// ```
///
/// `stopped` and `expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Paused,
    Stopped,
    Expired,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Expired => "expired",
        }
    }

    /// `stopped` or `expired`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Expired)
    }

    /// Counted against the owner quota: `active` or `paused`.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Check whether `self -> to` is permitted.
    pub fn can_transition_to(&self, to: AgentStatus) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Paused | Self::Stopped | Self::Expired)
                | (Self::Paused, Self::Stopped | Self::Expired)
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success,
    Failure,
    Timeout,
}

impl InvocationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for InvocationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared stop condition.
///
/// `max_invocations` and `expiry` feed the authoritative budget and expiry
/// fields when the registration is created. `goal_achieved` is stored for
/// the agent's benefit and never evaluated by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StopCondition {
    MaxInvocations { count: u32 },
    Expiry { at: DateTime<Utc> },
    GoalAchieved { check: String },
}

/// Caller-supplied options for a new registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub parent_id: Option<RegistrationId>,
    pub config: ConfigMap,
    pub triggers: Vec<Trigger>,
    pub stop_conditions: Vec<StopCondition>,
    /// Invocation budget. Defaults to `maxInvocationsDefault`.
    pub max_invocations: Option<u32>,
    /// Lifetime in days. Defaults to `maxLifetimeDays`.
    pub expires_in_days: Option<u32>,
    /// Child slots. Capped at `maxChildrenPerAgent`.
    pub max_children: Option<u32>,
}

impl RegistrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(mut self, parent_id: RegistrationId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }

    pub fn with_config_value(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_conditions.push(condition);
        self
    }

    pub fn with_max_invocations(mut self, max: u32) -> Self {
        self.max_invocations = Some(max);
        self
    }

    pub fn expires_in_days(mut self, days: u32) -> Self {
        self.expires_in_days = Some(days);
        self
    }

    pub fn with_max_children(mut self, max: u32) -> Self {
        self.max_children = Some(max);
        self
    }

    /// Effective budget: the smallest of the explicit option and any
    /// `max_invocations` stop condition, else `default`.
    pub fn effective_max_invocations(&self, default: u32) -> u32 {
        let from_conditions = self.stop_conditions.iter().filter_map(|c| match c {
            StopCondition::MaxInvocations { count } => Some(*count),
            _ => None,
        });
        self.max_invocations
            .into_iter()
            .chain(from_conditions)
            .min()
            .unwrap_or(default)
    }

    /// Effective expiry: `now + days` (explicit or `default_days`), pulled
    /// earlier by any `expiry` stop condition.
    ///
    /// `None` when `now + days` is out of the representable date range.
    pub fn effective_expires_at(
        &self,
        now: DateTime<Utc>,
        default_days: u32,
    ) -> Option<DateTime<Utc>> {
        let days = self.expires_in_days.unwrap_or(default_days);
        let horizon = chrono::Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_add_signed(span))?;
        let earliest = self
            .stop_conditions
            .iter()
            .filter_map(|c| match c {
                StopCondition::Expiry { at } => Some(*at),
                _ => None,
            })
            .fold(horizon, |earliest, at| earliest.min(at));
        Some(earliest)
    }
}

/// A registered agent instance.
///
/// Registrations are owned by the registry; values handed out are snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    pub id: RegistrationId,
    pub owner: OwnerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RegistrationId>,
    pub agent_type: AgentType,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub stop_conditions: Vec<StopCondition>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub status: AgentStatus,
    pub max_invocations: u32,
    pub invocation_count: u32,
    /// Admitted invocations that have not been recorded yet.
    #[serde(default)]
    pub in_flight: u32,
    pub max_children: u32,
    #[serde(default)]
    pub children: Vec<RegistrationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_invoked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<InvocationOutcome>,
}

impl AgentRegistration {
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// Expiry has passed, whether or not the sweep has flipped the status yet.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Invocations still available after counting in-flight reservations.
    pub fn remaining_invocations(&self) -> u32 {
        self.max_invocations
            .saturating_sub(self.invocation_count)
            .saturating_sub(self.in_flight)
    }

    /// Whether another child may be attached.
    pub fn has_child_capacity(&self) -> bool {
        (self.children.len() as u64) < u64::from(self.max_children)
    }
}
