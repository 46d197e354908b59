//! # Overseer
//!
//! Overseer registers, schedules and invokes autonomous agents under resource
//! limits. One misbehaving agent can time out or fail without taking the
//! rest of the fleet down.
//!
//! ## Core Components
//!
//! - **[Agent]**: the `run(input) -> output` capability an agent implements
//! - **[Registry]**: registrations, lifecycle and quota enforcement
//! - **[Executor]**: one bounded invocation with timeout and cancellation
//! - **[Scheduler]**: expiry sweep, event triggers and interval triggers on a tick
//!
//! ## Quick Start
//!
//! ```rust
//! use overseer::{
//!     Agent, AgentCatalog, AgentError, AgentInput, AgentOutput, AgentType, IntervalSchedule,
//!     OwnerId, RegistrationOptions, Scheduler, Trigger,
//! };
//! use std::sync::Arc;
//!
//! struct Scout;
//!
//! #[async_trait::async_trait]
//! impl Agent for Scout {
//!     async fn run(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
//!         Ok(AgentOutput::success(input.get_str("topic").unwrap_or("nothing")))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scout = AgentType::parse("scout")?;
//! let catalog = AgentCatalog::new().with_agent(scout.clone(), Arc::new(Scout));
//! let scheduler = Scheduler::builder(catalog).build()?;
//!
//! let registration = scheduler
//!     .register(
//!         OwnerId::parse("u1")?,
//!         scout,
//!         RegistrationOptions::new()
//!             .with_config_value("topic", "rust")
//!             .with_trigger(Trigger::cron(IntervalSchedule::parse("hourly")?)),
//!     )
//!     .await?;
//!
//! let result = scheduler.invoke(&registration.id, Default::default()).await?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Module aliases for namespaced access
// ============================================================================

pub use overseer_core as core;
pub use overseer_observability as observability;
pub use overseer_runtime as runtime;

#[cfg(feature = "testing")]
pub use overseer_testing as testing;

// ============================================================================
// Core types - agents, registrations, triggers
// ============================================================================

pub use overseer_core::{
    Agent, AgentContext, AgentError, AgentInput, AgentOutput, LlmCall, TokenUsage,
};

pub use overseer_core::{
    AgentRegistration, AgentStatus, InvocationOutcome, RegistrationOptions, StopCondition,
};

pub use overseer_core::{IntervalSchedule, Trigger, TriggerKind, TriggeredBy};

pub use overseer_core::{CancellationState, InvocationRequest, InvocationResult};

pub use overseer_core::{LimitOverrides, RuntimeLimits};

pub use overseer_core::{Clock, ConfigMap, ManualClock, SystemClock};

pub use overseer_core::{CoreError, CoreResult};

// ============================================================================
// Identifiers - validated newtypes
// ============================================================================

pub use overseer_core::{AgentType, DecisionId, OwnerId, RegistrationId, RunId};

// ============================================================================
// Runtime - registry, executor, scheduler
// ============================================================================

pub use overseer_runtime::{
    AgentCatalog, AgentFactory, Executor, Registry, RuntimeEvent, Scheduler, SchedulerBuilder,
    TickReport,
};

pub use overseer_runtime::{HookError, InvocationHooks, RunStarted};

pub use overseer_runtime::{InMemoryRegistrationStore, RegistrationStore, StoreError};

pub use overseer_runtime::{
    ConfigError, FleetAgent, FleetFile, RuntimeConfig, RuntimeConfigBuilder,
};

pub use overseer_runtime::{RuntimeError, RuntimeResult};

// ============================================================================
// Observability
// ============================================================================

pub use overseer_observability::{
    LogFormat, MetricsError, ObservabilityConfig, ObservabilityError, RuntimeMetrics,
    init_observability, init_tracing,
};
