//! Runner configuration.
//!
//! Values come from defaults, an optional JSON document, and `TASKFLOW_*`
//! environment overrides, in that order.

use crate::errors::TaskflowError;
use crate::pipeline::{
    BackoffStrategy, JitterStrategy, RetryPolicy, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_MAX_ROUTE_STEPS, DEFAULT_RETRY_DELAY_MS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by all environment overrides.
pub const ENV_PREFIX: &str = "TASKFLOW_";

/// Output format for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per record.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Defaults applied to pipelines and the tasks added through them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retries allowed per task after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Base wait between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Cap on any single wait in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Per-attempt timeout in milliseconds.
    #[serde(default)]
    pub attempt_timeout_ms: Option<u64>,
    /// Whole-run deadline in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Maximum node visits for routing graphs.
    #[serde(default = "default_max_route_steps")]
    pub max_route_steps: usize,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

fn default_max_route_steps() -> usize {
    DEFAULT_MAX_ROUTE_STEPS
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
            attempt_timeout_ms: None,
            deadline_ms: None,
            max_route_steps: default_max_route_steps(),
            log_format: LogFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, TaskflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TaskflowError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, TaskflowError> {
        Self::default().with_env_overrides()
    }

    /// Applies `TASKFLOW_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, TaskflowError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by full variable name.
    ///
    /// # Errors
    ///
    /// Returns `TaskflowError::Config` naming the variable whose value could
    /// not be parsed.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, TaskflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = parse_var("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_DELAY_MS") {
            self.retry_delay_ms = parse_var("RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("MAX_DELAY_MS") {
            self.max_delay_ms = parse_var("MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = get("BACKOFF") {
            self.backoff = parse_var("BACKOFF", &v)?;
        }
        if let Some(v) = get("JITTER") {
            self.jitter = parse_var("JITTER", &v)?;
        }
        if let Some(v) = get("ATTEMPT_TIMEOUT_MS") {
            self.attempt_timeout_ms = Some(parse_var("ATTEMPT_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("DEADLINE_MS") {
            self.deadline_ms = Some(parse_var("DEADLINE_MS", &v)?);
        }
        if let Some(v) = get("MAX_ROUTE_STEPS") {
            self.max_route_steps = parse_var("MAX_ROUTE_STEPS", &v)?;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.log_format = parse_var("LOG_FORMAT", &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), TaskflowError> {
        if self.max_route_steps == 0 {
            return Err(TaskflowError::Config(
                "max_route_steps must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(TaskflowError::Config(
                "attempt_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// The retry policy tasks get by default.
    ///
    /// The cap never clips the configured base delay.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let cap_ms = self.max_delay_ms.max(self.retry_delay_ms);
        RetryPolicy::fixed(self.max_retries, Duration::from_millis(self.retry_delay_ms))
            .with_max_delay(Duration::from_millis(cap_ms))
            .with_backoff(self.backoff)
            .with_jitter(self.jitter)
    }

    /// Per-attempt timeout, if configured.
    #[must_use]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Whole-run deadline, if configured.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, TaskflowError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        TaskflowError::Config(format!("{ENV_PREFIX}{name}={raw:?} is invalid: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RetryDecision;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.backoff, BackoffStrategy::Fixed);
        assert_eq!(config.jitter, JitterStrategy::None);
        assert_eq!(config.deadline(), None);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.max_route_steps, DEFAULT_MAX_ROUTE_STEPS);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = PipelineConfig {
            max_retries: 5,
            retry_delay_ms: 200,
            backoff: BackoffStrategy::Linear,
            ..PipelineConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
    }

    #[test]
    fn test_long_fixed_delay_is_not_capped() {
        let config = PipelineConfig::default()
            .with_overrides_from(lookup(&[("TASKFLOW_RETRY_DELAY_MS", "60000")]))
            .unwrap();

        let policy = config.retry_policy();
        assert_eq!(policy.decide(1), RetryDecision::Retry(Duration::from_secs(60)));
        assert_eq!(policy.delay_for(5), Duration::from_secs(60));
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            PipelineConfig::from_json_str(r#"{"max_retries": 1, "backoff": "exponential", "deadline_ms": 5000}"#)
                .unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.deadline(), Some(Duration::from_secs(5)));
        assert_eq!(config.retry_delay_ms, 1000);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"backoff": "sometimes"}"#),
            Err(TaskflowError::Serialization(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"max_route_steps": 0}"#),
            Err(TaskflowError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retry_delay_ms": 10, "log_format": "json"}}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retry_delay_ms, 10);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_from_missing_file() {
        assert!(matches!(
            PipelineConfig::from_file("/nonexistent/taskflow.json"),
            Err(TaskflowError::Io(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::default()
            .with_overrides_from(lookup(&[
                ("TASKFLOW_MAX_RETRIES", "0"),
                ("TASKFLOW_RETRY_DELAY_MS", " 25 "),
                ("TASKFLOW_JITTER", "equal"),
                ("TASKFLOW_ATTEMPT_TIMEOUT_MS", "750"),
                ("TASKFLOW_LOG_FORMAT", "JSON"),
            ]))
            .unwrap();

        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_delay_ms, 25);
        assert_eq!(config.jitter, JitterStrategy::Equal);
        assert_eq!(config.attempt_timeout(), Some(Duration::from_millis(750)));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_env_override_invalid_value() {
        let err = PipelineConfig::default()
            .with_overrides_from(lookup(&[("TASKFLOW_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("TASKFLOW_MAX_RETRIES"));
    }
}
