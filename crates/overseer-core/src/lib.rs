//! # Overseer Core
//!
//! Data model shared by every Overseer crate: identifiers, registrations and
//! their lifecycle, triggers and interval schedules, runtime limits, the
//! [`Agent`] trait agents implement, and a [`Clock`] abstraction.
//!
//! The runtime itself (registry, executor, scheduler) lives in
//! `overseer-runtime`.

pub mod agent;
pub mod clock;
pub mod error;
pub mod identifiers;
pub mod invocation;
pub mod limits;
pub mod registration;
pub mod schedule;
pub mod trigger;

/// Free-form JSON object used for registration config, invocation payloads,
/// event data and event filters.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

pub use agent::{Agent, AgentContext, AgentInput, AgentOutput, LlmCall, TokenUsage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AgentError, CoreError, CoreResult};
pub use identifiers::{AgentType, DecisionId, OwnerId, RegistrationId, RunId};
pub use invocation::{CancellationState, InvocationRequest, InvocationResult};
pub use limits::{LimitOverrides, RuntimeLimits};
pub use registration::{
    AgentRegistration, AgentStatus, InvocationOutcome, RegistrationOptions, StopCondition,
};
pub use schedule::IntervalSchedule;
pub use trigger::{Trigger, TriggerKind, TriggeredBy};
