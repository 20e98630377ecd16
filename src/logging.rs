//! # Logging Setup
//!
//! Installs the global `tracing` subscriber: console output always, plus a
//! daily-rolling log file when a log directory is configured.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// File name prefix for rolling log files
pub const LOG_FILE_PREFIX: &str = "agri-rover-link.log";

/// Build the level filter. `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initialize logging
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the program.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer());

    if config.log_dir.is_empty() {
        registry
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    registry
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_uses_configured_level() {
        // Only meaningful when RUST_LOG is unset, as it is in CI
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "warn".to_string(),
            log_dir: String::new(),
        };
        assert_eq!(env_filter(&config).to_string(), "warn");
    }

    // The only test that installs the global subscriber
    #[test]
    fn test_init_with_log_dir_writes_rolling_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            log_dir: dir.path().to_string_lossy().into_owned(),
        };

        let guard = init(&config).unwrap();
        assert!(guard.is_some());
        tracing::info!("rolling file check");
        drop(guard);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|name| name.starts_with(LOG_FILE_PREFIX)));

        // A second subscriber cannot be installed
        assert!(init(&config).is_err());
    }
}
