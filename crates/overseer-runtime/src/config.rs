//! # Environment-Based Configuration
//!
//! Runtime limits and scheduler settings can be overridden from the
//! environment without a rebuild.
//!
//! ## Environment Variables
//!
//! ### Limits
//! - `OVERSEER_MAX_AGENTS_PER_USER` - Live registrations per owner (default: 10)
//! - `OVERSEER_MAX_CHILDREN_PER_AGENT` - Child slots per registration (default: 5)
//! - `OVERSEER_MAX_INVOCATIONS_DEFAULT` - Default invocation budget (default: 100)
//! - `OVERSEER_MAX_LIFETIME_DAYS` - Default lifetime in days (default: 30)
//! - `OVERSEER_INVOCATION_TIMEOUT_MS` - Per-invocation timeout (default: 300000)
//! - `OVERSEER_SPAWN_RATE_LIMIT_PER_HOUR` - Children per parent per hour,
//!   `0` or `off` disables (default: 20)
//!
//! ### Scheduler
//! - `OVERSEER_TICK_INTERVAL_MS` - Tick cadence in milliseconds (default: 60000)
//! - `OVERSEER_CANCELLATION_RETENTION` - Honored cancellation records kept (default: 1024)

use crate::executor::DEFAULT_CANCELLATION_RETENTION;
use crate::scheduler::DEFAULT_TICK_INTERVAL;
use overseer_core::{LimitOverrides, RuntimeLimits};
use std::{env, time::Duration};

/// Smallest accepted tick interval.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub limits: RuntimeLimits,
    pub tick_interval: Duration,
    pub cancellation_retention: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            limits: RuntimeLimits::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            cancellation_retention: DEFAULT_CANCELLATION_RETENTION,
        }
    }
}

/// Builder for [`RuntimeConfig`] with environment variable support
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    overrides: LimitOverrides,
    tick_interval: Option<Duration>,
    cancellation_retention: Option<usize>,
}

impl RuntimeConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from `OVERSEER_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but does not
    /// parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        let overrides = &mut builder.overrides;
        if let Some(v) = get_env_u32("OVERSEER_MAX_AGENTS_PER_USER")? {
            overrides.max_agents_per_user = Some(v);
        }
        if let Some(v) = get_env_u32("OVERSEER_MAX_CHILDREN_PER_AGENT")? {
            overrides.max_children_per_agent = Some(v);
        }
        if let Some(v) = get_env_u32("OVERSEER_MAX_INVOCATIONS_DEFAULT")? {
            overrides.max_invocations_default = Some(v);
        }
        if let Some(v) = get_env_u32("OVERSEER_MAX_LIFETIME_DAYS")? {
            overrides.max_lifetime_days = Some(v);
        }
        if let Some(v) = get_env_u64("OVERSEER_INVOCATION_TIMEOUT_MS")? {
            overrides.invocation_timeout_ms = Some(v);
        }
        if let Some(v) = get_env_rate("OVERSEER_SPAWN_RATE_LIMIT_PER_HOUR")? {
            overrides.spawn_rate_limit_per_hour = Some(v);
        }

        if let Some(ms) = get_env_u64("OVERSEER_TICK_INTERVAL_MS")? {
            builder.tick_interval = Some(Duration::from_millis(ms));
        }
        if let Some(n) = get_env_usize("OVERSEER_CANCELLATION_RETENTION")? {
            builder.cancellation_retention = Some(n);
        }

        Ok(builder)
    }

    /// Layer `overrides` on top; fields set here win over earlier ones.
    #[must_use]
    pub fn overrides(mut self, overrides: &LimitOverrides) -> Self {
        let merged = &mut self.overrides;
        merged.max_agents_per_user = overrides
            .max_agents_per_user
            .or(merged.max_agents_per_user);
        merged.max_children_per_agent = overrides
            .max_children_per_agent
            .or(merged.max_children_per_agent);
        merged.max_invocations_default = overrides
            .max_invocations_default
            .or(merged.max_invocations_default);
        merged.max_lifetime_days = overrides.max_lifetime_days.or(merged.max_lifetime_days);
        merged.invocation_timeout_ms = overrides
            .invocation_timeout_ms
            .or(merged.invocation_timeout_ms);
        merged.spawn_rate_limit_per_hour = overrides
            .spawn_rate_limit_per_hour
            .or(merged.spawn_rate_limit_per_hour);
        self
    }

    #[must_use]
    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = Some(tick_interval);
        self
    }

    #[must_use]
    pub fn cancellation_retention(mut self, retention: usize) -> Self {
        self.cancellation_retention = Some(retention);
        self
    }

    /// Merge over defaults and validate
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for zero quotas, a timeout over
    /// 24 hours or a tick interval under 10ms.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        let limits = RuntimeLimits::merged(&self.overrides);
        limits
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let tick_interval = self.tick_interval.unwrap_or(DEFAULT_TICK_INTERVAL);
        if tick_interval < MIN_TICK_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "tick_interval must be at least {}ms",
                MIN_TICK_INTERVAL.as_millis()
            )));
        }

        Ok(RuntimeConfig {
            limits,
            tick_interval,
            cancellation_retention: self
                .cancellation_retention
                .unwrap_or(DEFAULT_CANCELLATION_RETENTION),
        })
    }
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_u32(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u32 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid usize value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

/// A rate where `off` means the same as `0` (disabled).
fn get_env_rate(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(val) if val.eq_ignore_ascii_case("off") => Ok(Some(0)),
        Ok(_) => get_env_u32(key),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_builder() {
        let config = RuntimeConfigBuilder::new().build().unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.limits.spawn_rate_limit_per_hour, Some(20));
    }

    #[test]
    fn test_overrides_layer() {
        let first = LimitOverrides {
            max_agents_per_user: Some(3),
            max_lifetime_days: Some(7),
            ..Default::default()
        };
        let second = LimitOverrides {
            max_agents_per_user: Some(4),
            spawn_rate_limit_per_hour: Some(0),
            ..Default::default()
        };
        let config = RuntimeConfigBuilder::new()
            .overrides(&first)
            .overrides(&second)
            .build()
            .unwrap();

        assert_eq!(config.limits.max_agents_per_user, 4);
        assert_eq!(config.limits.max_lifetime_days, 7);
        assert_eq!(config.limits.spawn_rate_limit_per_hour, None);
    }

    #[test]
    fn test_builder_validation_zero_quota() {
        let result = RuntimeConfigBuilder::new()
            .overrides(&LimitOverrides {
                max_invocations_default: Some(0),
                ..Default::default()
            })
            .build();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("maxInvocationsDefault must be positive")
        );
    }

    #[test]
    fn test_builder_validation_tick_interval() {
        let result = RuntimeConfigBuilder::new()
            .tick_interval(Duration::from_millis(5))
            .build();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_env_missing_is_none() {
        assert_eq!(get_env_u32("OVERSEER_NONEXISTENT_VAR").unwrap(), None);
        assert_eq!(get_env_rate("OVERSEER_NONEXISTENT_VAR").unwrap(), None);
    }
}
