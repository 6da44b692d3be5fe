//! Daemon configuration: TOML file with environment variable overrides.
//!
//! Looks for `zoneplan.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.
//!
//! This is the daemon's own configuration (logging, timing, file locations).
//! Which thermostats to drive lives in the planner configuration file, see
//! [`StorageConfig::planner_config_path`].

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;
use zoneplan_adapter_hass::HassConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Hub connection tuning. Host and token come from the planner
    /// configuration and replace the values given here.
    pub hub: HassConfig,
    /// Control loop timing.
    pub control: ControlConfig,
    /// File locations.
    pub storage: StorageConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Control loop timing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Interval between evaluations, in milliseconds.
    pub tick_ms: u64,
    /// Window during which an identical setpoint command is not repeated.
    pub debounce_secs: i64,
}

/// File locations.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Planner configuration file, created with defaults when missing.
    pub planner_config_path: PathBuf,
}

impl Config {
    /// Load configuration from `zoneplan.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("zoneplan.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ZONEPLAN_PLANNER_CONFIG") {
            self.storage.planner_config_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("ZONEPLAN_TICK_MS")
            && let Ok(tick_ms) = val.parse()
        {
            self.control.tick_ms = tick_ms;
        }
        if let Ok(val) = std::env::var("ZONEPLAN_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.control.tick_ms == 0 {
            return Err(ConfigError::Validation("tick_ms must be non-zero".to_string()));
        }
        if self.control.debounce_secs < 0 {
            return Err(ConfigError::Validation(
                "debounce_secs must not be negative".to_string(),
            ));
        }
        if self.hub.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "hub timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl ControlConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub fn debounce(&self) -> TimeDelta {
        TimeDelta::seconds(self.debounce_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "zonepland=info,zoneplan_app=info,zoneplan_adapter_hass=info".to_string(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            debounce_secs: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            planner_config_path: PathBuf::from("planner.toml"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.control.tick(), Duration::from_secs(1));
        assert_eq!(config.control.debounce(), TimeDelta::seconds(10));
        assert_eq!(config.storage.planner_config_path, PathBuf::from("planner.toml"));
        assert_eq!(config.hub.port, 8123);
        assert!(config.logging.filter.contains("zonepland=info"));
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.control.tick_ms, 1000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [logging]
            filter = 'debug'

            [hub]
            protocol = 'wss'
            port = 443
            timeout_ms = 2000
            retry_timeout_ms = 1000
            retry_count = 5

            [control]
            tick_ms = 500
            debounce_secs = 30

            [storage]
            planner_config_path = '/var/lib/zoneplan/planner.toml'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.hub.protocol, "wss");
        assert_eq!(config.hub.port, 443);
        assert_eq!(config.hub.retry_count, Some(5));
        assert_eq!(config.control.tick(), Duration::from_millis(500));
        assert_eq!(config.control.debounce(), TimeDelta::seconds(30));
        assert_eq!(
            config.storage.planner_config_path,
            PathBuf::from("/var/lib/zoneplan/planner.toml")
        );
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let toml = "
            [control]
            tick_ms = 250
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.control.tick_ms, 250);
        assert_eq!(config.control.debounce_secs, 10);
        assert_eq!(config.hub.host, "localhost");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.control.tick_ms, 1000);
    }

    #[test]
    fn should_reject_zero_tick() {
        let mut config = Config::default();
        config.control.tick_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_negative_debounce() {
        let mut config = Config::default();
        config.control.debounce_secs = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_accept_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
