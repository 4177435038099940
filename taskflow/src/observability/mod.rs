//! Log output setup.
//!
//! Library code only emits through `tracing`; binaries call
//! [`init_tracing`] once to decide where records go.

use crate::config::LogFormat;
use crate::errors::TaskflowError;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Builds the filter from `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs a global `fmt` subscriber in the given format.
///
/// # Errors
///
/// Returns `TaskflowError::Config` if a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<(), TaskflowError> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter()).with_target(false);
    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.map_err(|e| TaskflowError::Config(format!("tracing subscriber not installed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let _ = init_tracing(LogFormat::Pretty);
        assert!(init_tracing(LogFormat::Json).is_err());
    }

    #[test]
    fn test_env_filter_builds() {
        let filter = env_filter();
        assert!(!filter.to_string().is_empty());
    }
}
