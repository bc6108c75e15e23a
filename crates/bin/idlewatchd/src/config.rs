//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `idlewatch.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use idlewatch_app::scheduler::SchedulerConfig;
use idlewatch_domain::time::WatchDuration;
use idlewatch_domain::watch::{WatchKind, validate_name};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Timer scheduler settings.
    pub scheduler: SchedulerSection,
    /// Watches to create at startup.
    pub watches: Vec<WatchConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Scheduler configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// How long a cancel waits for the scheduler to acknowledge, in milliseconds.
    pub ack_timeout_ms: u64,
}

/// One inactivity watch.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Item name the watch is bound to.
    pub name: String,
    /// Inactivity period in seconds.
    pub seconds: f64,
    /// `no_update` or `no_change`.
    pub kind: WatchKind,
}

impl Config {
    /// Load configuration from `idlewatch.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("idlewatch.toml")?;
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
        if let Ok(val) = std::env::var("IDLEWATCH_ACK_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.scheduler.ack_timeout_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("IDLEWATCH_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.ack_timeout_ms == 0 {
            return Err(ConfigError::Validation("ack_timeout_ms must be non-zero".to_string()));
        }
        for (index, watch) in self.watches.iter().enumerate() {
            if let Err(err) = validate_name(&watch.name) {
                return Err(ConfigError::Validation(format!("watches[{index}]: {err}")));
            }
            if let Err(err) = WatchDuration::from_secs(watch.seconds) {
                return Err(ConfigError::Validation(format!(
                    "watches[{index}] ({}): {err}",
                    watch.name
                )));
            }
        }
        Ok(())
    }

    /// Scheduler settings in the form the scheduler expects.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            ack_timeout: Duration::from_millis(self.scheduler.ack_timeout_ms),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "idlewatchd=info,idlewatch_app=info".to_string(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
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
        assert_eq!(config.scheduler.ack_timeout_ms, 5000);
        assert_eq!(config.logging.filter, "idlewatchd=info,idlewatch_app=info");
        assert!(config.watches.is_empty());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.ack_timeout_ms, 5000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [logging]
            filter = 'debug'

            [scheduler]
            ack_timeout_ms = 250

            [[watches]]
            name = 'TempSensor'
            seconds = 5
            kind = 'no_update'

            [[watches]]
            name = 'Door'
            seconds = 2.5
            kind = 'no_change'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.scheduler.ack_timeout_ms, 250);
        assert_eq!(config.watches.len(), 2);
        assert_eq!(config.watches[0].name, "TempSensor");
        assert!((config.watches[0].seconds - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.watches[0].kind, WatchKind::NoUpdate);
        assert_eq!(config.watches[1].kind, WatchKind::NoChange);
    }

    #[test]
    fn should_reject_unknown_watch_kind() {
        let toml = "
            [[watches]]
            name = 'Door'
            seconds = 3
            kind = 'no_idea'
        ";
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.scheduler.ack_timeout_ms, 5000);
    }

    #[test]
    fn should_reject_zero_ack_timeout() {
        let mut config = Config::default();
        config.scheduler.ack_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_empty_watch_name() {
        let mut config = Config::default();
        config.watches.push(WatchConfig {
            name: "  ".to_string(),
            seconds: 5.0,
            kind: WatchKind::NoUpdate,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_invalid_watch_duration() {
        for seconds in [0.0, -1.0, f64::NAN, 1e20] {
            let mut config = Config::default();
            config.watches.push(WatchConfig {
                name: "Door".to_string(),
                seconds,
                kind: WatchKind::NoChange,
            });
            assert!(config.validate().is_err(), "accepted {seconds}");
        }
    }

    #[test]
    fn should_accept_valid_watches() {
        let mut config = Config::default();
        config.watches.push(WatchConfig {
            name: "Door".to_string(),
            seconds: 3.0,
            kind: WatchKind::NoChange,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_convert_ack_timeout_to_duration() {
        let mut config = Config::default();
        config.scheduler.ack_timeout_ms = 1500;
        assert_eq!(
            config.scheduler_config().ack_timeout,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
