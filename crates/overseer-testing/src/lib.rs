//! # Overseer Testing
//!
//! Test doubles for the Overseer runtime.
//!
//! - **Mock agents**: [`MockAgent`] with scripted results, [`HangingAgent`]
//!   that never returns, [`CooperativeAgent`] that honours cancellation
//! - **Hooks**: [`RecordingHooks`] and [`FailingHooks`]
//! - **Helpers**: [`mock_catalog`], [`test_clock`], [`wait_until`]
//!
//! ```rust
//! use overseer_core::Agent;
//! use overseer_testing::{MockAgent, mock_catalog};
//! use std::sync::Arc;
//!
//! let echo: Arc<dyn Agent> = Arc::new(MockAgent::succeeding("hi"));
//! let catalog = mock_catalog([("echo", echo)]);
//! assert_eq!(catalog.supported_types().len(), 1);
//! ```

pub mod helpers;
pub mod hooks;
pub mod mock_agents;

pub use helpers::{agent_type, mock_catalog, owner, test_clock, wait_until};
pub use hooks::{FailingHooks, RecordingHooks};
pub use mock_agents::{CooperativeAgent, HangingAgent, MockAgent};
