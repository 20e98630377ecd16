//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{AgriLinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sensor feed configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Telemetry reconnection policy
#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_enabled")]
    pub enabled: bool,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// 0 means unlimited
    #[serde(default)]
    pub max_attempts: u32,
}

/// Assistant relay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    #[serde(default = "default_failure_notice")]
    pub failure_notice: String,

    #[serde(default = "default_persona")]
    pub persona: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; empty logs to the console only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_telemetry_endpoint() -> String { "ws://192.168.50.79/ws".to_string() }
fn default_history_capacity() -> usize { 50 }

fn default_reconnect_enabled() -> bool { true }
fn default_initial_backoff_ms() -> u64 { 500 }
fn default_max_backoff_ms() -> u64 { 30_000 }

fn default_assistant_endpoint() -> String { "ws://localhost:8000/ws".to_string() }
fn default_end_marker() -> String { "[[DONE]]".to_string() }
fn default_failure_notice() -> String { "Connection error. Please try again.".to_string() }
fn default_persona() -> String {
    "You are AgriRobot, a smart assistant for agriculture.".to_string()
}

fn default_log_level() -> String { "info".to_string() }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_telemetry_endpoint(),
            history_capacity: default_history_capacity(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconnect_enabled(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: 0,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: default_assistant_endpoint(),
            end_marker: default_end_marker(),
            failure_notice: default_failure_notice(),
            persona: default_persona(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn invalid(message: impl std::fmt::Display) -> AgriLinkError {
    AgriLinkError::Config(toml::de::Error::custom(message))
}

fn validate_endpoint(name: &str, endpoint: &str) -> Result<()> {
    if endpoint.is_empty() {
        return Err(invalid(format!("{} cannot be empty", name)));
    }
    if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
        return Err(invalid(format!("{} must be a ws:// or wss:// URL", name)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use agri_rover_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        validate_endpoint("telemetry endpoint", &self.telemetry.endpoint)?;
        validate_endpoint("assistant endpoint", &self.assistant.endpoint)?;

        if self.telemetry.history_capacity == 0 || self.telemetry.history_capacity > 10_000 {
            return Err(invalid("history_capacity must be between 1 and 10000"));
        }

        let reconnect = &self.telemetry.reconnect;
        if reconnect.initial_backoff_ms == 0 || reconnect.initial_backoff_ms > 60_000 {
            return Err(invalid("initial_backoff_ms must be between 1 and 60000"));
        }

        if reconnect.max_backoff_ms < reconnect.initial_backoff_ms
            || reconnect.max_backoff_ms > 600_000
        {
            return Err(invalid(
                "max_backoff_ms must be between initial_backoff_ms and 600000",
            ));
        }

        // Must be distinguishable from ordinary response text
        if self.assistant.end_marker.trim().is_empty() {
            return Err(invalid("end_marker cannot be empty"));
        }

        if self.assistant.failure_notice.trim().is_empty() {
            return Err(invalid("failure_notice cannot be empty"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
