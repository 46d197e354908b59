//! Overseer Observability
//!
//! Structured logging setup and Prometheus metrics for the Overseer runtime.
//! Metrics live in a per-instance registry so several runtimes (or tests) can
//! coexist in one process.

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "tracing")]
pub mod trace;

#[cfg(feature = "metrics")]
pub use metrics::{MetricsError, RuntimeMetrics};

#[cfg(feature = "tracing")]
pub use trace::init_tracing;

use serde::{Deserialize, Serialize};
#[cfg(feature = "metrics")]
use std::sync::Arc;

/// Latency buckets for invocation durations, from 5ms to 15 minutes.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.05,  // 50ms
    0.25,  // 250ms
    1.0,   // 1s
    5.0,   // 5s
    15.0,  // 15s
    60.0,  // 1m
    300.0, // 5m
    900.0, // 15m
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(ObservabilityError::Config(format!(
                "unknown log format '{other}' (expected json, pretty or compact)"
            ))),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub metrics_enabled: bool,
    /// Install a global tracing subscriber
    pub tracing_enabled: bool,
    /// Metrics namespace prefix
    pub namespace: String,
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            tracing_enabled: true,
            namespace: "overseer".to_string(),
            log_format: LogFormat::Json,
            default_filter: "info".to_string(),
        }
    }
}

/// Initialize logging and metrics. Returns the metrics handle when enabled.
#[cfg(feature = "metrics")]
pub fn init_observability(
    config: &ObservabilityConfig,
) -> Result<Option<Arc<RuntimeMetrics>>, ObservabilityError> {
    #[cfg(feature = "tracing")]
    if config.tracing_enabled {
        trace::init_tracing(config)?;
    }

    if !config.metrics_enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(RuntimeMetrics::new(&config.namespace)?)))
}

/// Observability framework errors
#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "metrics")]
    #[error("Metrics error: {0}")]
    Metrics(#[from] metrics::MetricsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn metrics_only_init_returns_handle() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let config = ObservabilityConfig {
            tracing_enabled: false,
            namespace: format!("test{}", &id[0..8]),
            ..Default::default()
        };
        let metrics = init_observability(&config).unwrap();
        assert!(metrics.is_some());

        let disabled = ObservabilityConfig {
            tracing_enabled: false,
            metrics_enabled: false,
            ..Default::default()
        };
        assert!(init_observability(&disabled).unwrap().is_none());
    }
}
