//! Triggers: the reasons an invocation happens.

use crate::ConfigMap;
use crate::identifiers::{RegistrationId, RunId};
use crate::schedule::IntervalSchedule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One way a registration can be invoked.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type": "cron", "schedule": "hourly"}` or
/// `{"type": "event", "eventType": "news.published", "filter": {"lang": "en"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Trigger {
    /// Invoked directly by a caller.
    Manual { invoked_by: String },

    /// Invoked on a fixed interval.
    Cron {
        schedule: IntervalSchedule,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_run: Option<DateTime<Utc>>,
    },

    /// Invoked when a matching event is emitted.
    Event {
        event_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<ConfigMap>,
    },

    /// Invoked by a parent registration during one of its runs.
    ParentAgent {
        parent_agent_id: RegistrationId,
        parent_run_id: RunId,
    },
}

impl Trigger {
    /// Manual trigger attributed to `invoked_by`.
    pub fn manual(invoked_by: impl Into<String>) -> Self {
        Self::Manual {
            invoked_by: invoked_by.into(),
        }
    }

    /// Cron trigger that has never fired.
    pub fn cron(schedule: IntervalSchedule) -> Self {
        Self::Cron {
            schedule,
            last_run: None,
        }
    }

    /// Event trigger without a filter.
    pub fn event(event_type: impl Into<String>) -> Self {
        Self::Event {
            event_type: event_type.into(),
            filter: None,
        }
    }

    /// Event trigger that only matches events whose data contains every
    /// key/value pair of `filter`.
    pub fn event_filtered(event_type: impl Into<String>, filter: ConfigMap) -> Self {
        Self::Event {
            event_type: event_type.into(),
            filter: Some(filter),
        }
    }

    pub fn parent_agent(parent_agent_id: RegistrationId, parent_run_id: RunId) -> Self {
        Self::ParentAgent {
            parent_agent_id,
            parent_run_id,
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Manual { .. } => TriggerKind::Manual,
            Self::Cron { .. } => TriggerKind::Cron,
            Self::Event { .. } => TriggerKind::Event,
            Self::ParentAgent { .. } => TriggerKind::ParentAgent,
        }
    }

    /// The `{type, ref}` pair handed to the agent. The reference is the
    /// invoker for manual triggers, the schedule for cron, the event type for
    /// events and the parent registration id for parent triggers.
    pub fn triggered_by(&self) -> TriggeredBy {
        let reference = match self {
            Self::Manual { invoked_by } => invoked_by.clone(),
            Self::Cron { schedule, .. } => schedule.to_string(),
            Self::Event { event_type, .. } => event_type.clone(),
            Self::ParentAgent {
                parent_agent_id, ..
            } => parent_agent_id.to_string(),
        };
        TriggeredBy {
            kind: self.kind(),
            reference,
        }
    }

    /// Whether this trigger fires for an emitted event.
    ///
    /// Only event triggers match. The type must be equal, and when a filter
    /// is present every filter key must exist in `data` with an equal value.
    pub fn matches_event(&self, event_type: &str, data: &ConfigMap) -> bool {
        match self {
            Self::Event {
                event_type: expected,
                filter,
            } => {
                expected == event_type
                    && filter.as_ref().is_none_or(|filter| {
                        filter
                            .iter()
                            .all(|(key, value)| data.get(key) == Some(value))
                    })
            }
            _ => false,
        }
    }
}

/// Discriminant of a [`Trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Cron,
    Event,
    ParentAgent,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Cron => "cron",
            Self::Event => "event",
            Self::ParentAgent => "parent_agent",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run was started, as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredBy {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(rename = "ref")]
    pub reference: String,
}
