//! Small helpers shared by runtime tests.

use chrono::{TimeZone, Utc};
use overseer_core::{Agent, AgentType, ManualClock, OwnerId};
use overseer_runtime::AgentCatalog;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Build a catalog from `(agent_type, agent)` pairs.
///
/// # Panics
///
/// Panics if an agent type name is invalid.
pub fn mock_catalog<'a>(
    agents: impl IntoIterator<Item = (&'a str, Arc<dyn Agent>)>,
) -> AgentCatalog {
    agents
        .into_iter()
        .fold(AgentCatalog::new(), |catalog, (name, agent)| {
            catalog.with_agent(agent_type(name), agent)
        })
}

/// # Panics
///
/// Panics if `name` is not a valid agent type.
pub fn agent_type(name: &str) -> AgentType {
    AgentType::parse(name).unwrap_or_else(|e| panic!("bad agent type {name:?}: {e}"))
}

/// # Panics
///
/// Panics if `name` is not a valid owner id.
pub fn owner(name: &str) -> OwnerId {
    OwnerId::parse(name).unwrap_or_else(|e| panic!("bad owner {name:?}: {e}"))
}

/// A manual clock parked at 2026-01-01T00:00:00Z.
pub fn test_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns whether it held.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
