//! `overseer simulate`: run a fleet file against the demo agents on a
//! manual clock and print what happened.

use crate::agents::demo_catalog;
use chrono::{Duration, Utc};
use overseer::{
    AgentStatus, ConfigError, ConfigMap, CoreError, FleetFile, InvocationOutcome, ManualClock,
    MetricsError, OwnerId, RegistrationId, RuntimeConfigBuilder, RuntimeError, RuntimeMetrics,
    Scheduler, TickReport,
};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SimulateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Invalid --emit value '{0}': expected TYPE or TYPE=JSON_OBJECT")]
    InvalidEmit(String),
}

#[derive(Debug)]
pub struct SimulateArgs {
    pub fleet: PathBuf,
    pub ticks: u32,
    pub advance_minutes: i64,
    pub emit: Vec<String>,
    pub metrics: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationSummary {
    id: RegistrationId,
    owner: OwnerId,
    agent_type: String,
    status: AgentStatus,
    invocation_count: u32,
    max_invocations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_result: Option<InvocationOutcome>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Rejection {
    owner: OwnerId,
    agent_type: String,
    code: &'static str,
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    ticks: Vec<TickReport>,
    registrations: Vec<RegistrationSummary>,
    rejected: Vec<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<String>,
}

/// Parse `TYPE` or `TYPE={"k":1}` into an event.
pub fn parse_emit(raw: &str) -> Result<(String, ConfigMap), SimulateError> {
    let (event_type, data) = match raw.split_once('=') {
        Some((event_type, json)) => {
            let data = match serde_json::from_str::<Value>(json) {
                Ok(Value::Object(map)) => map,
                _ => return Err(SimulateError::InvalidEmit(raw.to_string())),
            };
            (event_type, data)
        }
        None => (raw, ConfigMap::new()),
    };
    if event_type.trim().is_empty() {
        return Err(SimulateError::InvalidEmit(raw.to_string()));
    }
    Ok((event_type.to_string(), data))
}

pub async fn run_simulation(args: SimulateArgs) -> Result<SimulationSummary, SimulateError> {
    let fleet = FleetFile::load(&args.fleet)?;
    let config = RuntimeConfigBuilder::from_env()?
        .overrides(&fleet.limits)
        .build()?;
    let events = args
        .emit
        .iter()
        .map(|raw| parse_emit(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let clock = ManualClock::new(Utc::now());
    let metrics = Arc::new(RuntimeMetrics::new("overseer")?);
    let scheduler = Scheduler::builder(demo_catalog()?)
        .config(config)
        .clock(Arc::new(clock.clone()))
        .metrics(Arc::clone(&metrics))
        .build()?;

    let mut rejected = Vec::new();
    for agent in &fleet.agents {
        match scheduler
            .register(agent.owner.clone(), agent.agent_type.clone(), agent.options())
            .await
        {
            Ok(registration) => {
                info!(registration_id = %registration.id, "Fleet agent registered");
            }
            Err(e) => {
                warn!(owner = %agent.owner, error = %e, "Fleet agent rejected");
                rejected.push(Rejection {
                    owner: agent.owner.clone(),
                    agent_type: agent.agent_type.to_string(),
                    code: e.error_code(),
                    error: e.to_string(),
                });
            }
        }
    }

    for (event_type, data) in events {
        scheduler.emit(event_type, data);
    }

    let mut ticks = Vec::with_capacity(args.ticks as usize);
    for tick in 0..args.ticks {
        if tick > 0 {
            clock.advance(Duration::minutes(args.advance_minutes));
        }
        ticks.push(scheduler.tick().await?);
        scheduler.wait_idle().await;
    }

    let registrations = scheduler
        .registry()
        .list()
        .await?
        .into_iter()
        .map(|registration| RegistrationSummary {
            id: registration.id,
            owner: registration.owner,
            agent_type: registration.agent_type.to_string(),
            status: registration.status,
            invocation_count: registration.invocation_count,
            max_invocations: registration.max_invocations,
            last_result: registration.last_result,
        })
        .collect();

    let metrics = if args.metrics {
        Some(metrics.gather_text()?)
    } else {
        None
    };

    Ok(SimulationSummary {
        ticks,
        registrations,
        rejected,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_emit() {
        let (event_type, data) = parse_emit(r#"news={"k":1}"#).unwrap();
        assert_eq!(event_type, "news");
        assert_eq!(data["k"], 1);

        let (event_type, data) = parse_emit("ping").unwrap();
        assert_eq!(event_type, "ping");
        assert!(data.is_empty());

        assert!(parse_emit("news=[1]").is_err());
        assert!(parse_emit("=1").is_err());
    }

    #[tokio::test]
    async fn test_simulation_runs_fleet() {
        let mut fleet = tempfile::NamedTempFile::new().unwrap();
        write!(
            fleet,
            r#"
[limits]
maxAgentsPerUser = 1

[[agents]]
owner = "u1"
agent_type = "echo"
max_invocations = 2
triggers = [{{ type = "cron", schedule = "hourly" }}]

[[agents]]
owner = "u1"
agent_type = "echo"

[[agents]]
owner = "u2"
agent_type = "flaky"
triggers = [{{ type = "event", eventType = "news" }}]
"#
        )
        .unwrap();

        let summary = run_simulation(SimulateArgs {
            fleet: fleet.path().to_path_buf(),
            ticks: 3,
            advance_minutes: 60,
            emit: vec!["news".to_string()],
            metrics: true,
        })
        .await
        .unwrap();

        assert_eq!(summary.ticks.len(), 3);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].code, "OWNER_QUOTA_EXCEEDED");

        let echo = &summary.registrations[0];
        assert_eq!(echo.invocation_count, 2);
        assert_eq!(echo.status, AgentStatus::Stopped);

        let flaky = &summary.registrations[1];
        assert_eq!(flaky.invocation_count, 1);
        assert_eq!(flaky.last_result, Some(InvocationOutcome::Success));
        assert!(
            summary
                .metrics
                .as_deref()
                .unwrap()
                .contains("overseer_invocations_total")
        );
    }
}
