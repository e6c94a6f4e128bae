//! Logging setup
//!
//! Installs a global `tracing` subscriber from the `log` config section.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LogConfig;

/// Logging initialization errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// Level is not a valid filter directive
    InvalidFilter(String),
    /// A global subscriber is already installed
    AlreadyInitialized(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::InvalidFilter(msg) => write!(f, "Invalid log filter: {}", msg),
            LoggingError::AlreadyInitialized(msg) => {
                write!(f, "Logging already initialized: {}", msg)
            }
        }
    }
}

impl std::error::Error for LoggingError {}

/// Build the filter for a config, preferring `RUST_LOG`
pub fn filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(config.level.to_lowercase()),
    }
    .map_err(|e| LoggingError::InvalidFilter(e.to_string()))
}

/// Install the global subscriber
pub fn init(config: &LogConfig) -> Result<(), LoggingError> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter(config)?)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(level: &str) -> LogConfig {
        LogConfig {
            level: level.to_string(),
        }
    }

    #[test]
    fn test_filter_accepts_levels_and_directives() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        assert!(filter(&level("DEBUG")).is_ok());
        assert!(filter(&level("topicstore=trace,warn")).is_ok());
    }

    #[test]
    fn test_filter_rejects_garbage() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        assert!(matches!(
            filter(&level("topicstore=notalevel")),
            Err(LoggingError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_init_twice_fails() {
        let config = LogConfig::default();
        // Another test may have won the race; either way the second call fails.
        let _ = init(&config);
        assert!(matches!(
            init(&config),
            Err(LoggingError::AlreadyInitialized(_)) | Err(LoggingError::InvalidFilter(_))
        ));
    }
}
