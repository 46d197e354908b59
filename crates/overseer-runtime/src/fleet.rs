//! Fleet files: a TOML description of limits and registrations to create.
//!
//! ```toml
//! [limits]
//! maxAgentsPerUser = 3
//!
//! [[agents]]
//! owner = "u1"
//! agent_type = "echo"
//! max_invocations = 5
//! triggers = [{ type = "cron", schedule = "hourly" }]
//! config = { topic = "rust" }
//! ```

use crate::config::ConfigError;
use overseer_core::{
    AgentType, ConfigMap, LimitOverrides, OwnerId, RegistrationOptions, Trigger,
};
use serde::Deserialize;
use std::path::Path;

/// Parsed fleet file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetFile {
    #[serde(default)]
    pub limits: LimitOverrides,
    #[serde(default)]
    pub agents: Vec<FleetAgent>,
}

/// One registration in a fleet file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetAgent {
    pub owner: OwnerId,
    pub agent_type: AgentType,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    pub max_invocations: Option<u32>,
    pub expires_in_days: Option<u32>,
}

impl FleetFile {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }
}

impl FleetAgent {
    pub fn options(&self) -> RegistrationOptions {
        RegistrationOptions {
            config: self.config.clone(),
            triggers: self.triggers.clone(),
            max_invocations: self.max_invocations,
            expires_in_days: self.expires_in_days,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_core::IntervalSchedule;
    use std::io::Write;

    const FLEET: &str = r#"
[limits]
maxAgentsPerUser = 3
spawnRateLimitPerHour = 0

[[agents]]
owner = "u1"
agent_type = "echo"
max_invocations = 5
config = { topic = "rust" }
triggers = [
  { type = "cron", schedule = "hourly" },
  { type = "event", eventType = "news", filter = { k = 1 } },
]

[[agents]]
owner = "u2"
agent_type = "flaky"
"#;

    #[test]
    fn test_parse_fleet() {
        let fleet = FleetFile::parse(FLEET).unwrap();
        assert_eq!(fleet.limits.max_agents_per_user, Some(3));
        assert_eq!(fleet.limits.spawn_rate_limit_per_hour, Some(0));
        assert_eq!(fleet.agents.len(), 2);

        let echo = &fleet.agents[0];
        assert_eq!(echo.agent_type.as_str(), "echo");
        assert_eq!(echo.config["topic"], "rust");
        assert_eq!(
            echo.triggers[0],
            Trigger::cron(IntervalSchedule::EveryHours(1))
        );
        assert!(echo.triggers[1].matches_event("news", &echo_data(1)));
        assert!(!echo.triggers[1].matches_event("news", &echo_data(2)));

        let options = echo.options();
        assert_eq!(options.max_invocations, Some(5));
        assert_eq!(options.triggers.len(), 2);
        assert!(fleet.agents[1].triggers.is_empty());
    }

    fn echo_data(k: i64) -> ConfigMap {
        let mut data = ConfigMap::new();
        data.insert("k".to_string(), k.into());
        data
    }

    #[test]
    fn test_unknown_schedule_is_parse_error() {
        let source = r#"
[[agents]]
owner = "u1"
agent_type = "echo"
triggers = [{ type = "cron", schedule = "every_fortnight" }]
"#;
        assert!(matches!(
            FleetFile::parse(source),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FLEET.as_bytes()).unwrap();
        let fleet = FleetFile::load(file.path()).unwrap();
        assert_eq!(fleet.agents.len(), 2);

        let missing = FleetFile::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
