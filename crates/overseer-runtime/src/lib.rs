//! # Overseer Runtime
//!
//! Registration bookkeeping, bounded invocation and trigger scheduling for
//! autonomous agents.
//!
//! - [`Registry`] owns every [`AgentRegistration`](overseer_core::AgentRegistration)
//!   and enforces owner, child, spawn-rate and invocation quotas.
//! - [`Executor`] runs one invocation with a timeout and cooperative
//!   cancellation, normalizing the outcome.
//! - [`Scheduler`] drives expiry, event and cron triggers on a fixed tick.
//!
//! ```no_run
//! use overseer_runtime::{AgentCatalog, Scheduler};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::builder(AgentCatalog::new()).build()?;
//! scheduler.start().await;
//! scheduler.emit("news.published", Default::default());
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod hooks;
pub mod rate_limit;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use catalog::{AgentCatalog, AgentFactory};
pub use config::{ConfigError, RuntimeConfig, RuntimeConfigBuilder};
pub use error::{RuntimeError, RuntimeResult};
pub use executor::Executor;
pub use fleet::{FleetAgent, FleetFile};
pub use hooks::{DEFAULT_HOOK_TIMEOUT, HookError, InvocationHooks, RunStarted};
pub use rate_limit::SpawnRateLimiter;
pub use registry::Registry;
pub use scheduler::{RuntimeEvent, Scheduler, SchedulerBuilder, TickReport};
pub use store::{InMemoryRegistrationStore, RegistrationStore, StoreError, StoreResult};
