//! Configuration loaded from `config.toml`

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::common::constants::{
    DEFAULT_BASELINE, DEFAULT_ENQUEUE_ATTEMPTS, DEFAULT_ENQUEUE_TIMEOUT_MS,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_RESULT_CAPACITY, DEFAULT_TRACE_DIR,
};
use crate::logging::{LogRotation, LoggingConfig};
use crate::rules::Thresholds;
use crate::service::ServiceConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// `[service]` section
#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceTomlConfig {
    pub session_workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub enqueue_timeout_ms: Option<u64>,
    pub enqueue_attempts: Option<u32>,
    pub result_capacity: Option<usize>,
    pub trace_dir: Option<String>,
}

/// `[thresholds]` section
#[derive(Debug, Clone, Default, Deserialize)]
struct ThresholdsTomlConfig {
    pub baseline: Option<f64>,
    pub proportion: Option<f64>,
    pub min_calls_time_wasting: Option<usize>,
    pub min_calls_n_plus_one: Option<usize>,
    pub sigma_factor: Option<f64>,
    pub max_merge_rounds: Option<usize>,
    pub recursion_call_budget: Option<usize>,
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
struct LoggingTomlConfig {
    pub log_dir: Option<String>,
    pub level_filter: Option<String>,
    pub rotation: Option<LogRotation>, // "minutely", "hourly", "daily" or "never"
    pub retention_days: Option<u32>,
}

/// Raw file layout; every section may be left out
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    pub service: ServiceTomlConfig,
    #[serde(default)]
    pub thresholds: ThresholdsTomlConfig,
    pub logging: Option<LoggingTomlConfig>,
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone)]
pub struct DiagnosisConfig {
    pub service: ServiceConfig,
    pub baseline: f64,
    pub thresholds: Thresholds,
    pub trace_dir: PathBuf,
    pub logging: LoggingConfig,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self::from_toml_config(TomlConfig::default())
    }
}

impl DiagnosisConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let toml_config: TomlConfig = toml::from_str(content)?;
        let config = Self::from_toml_config(toml_config);
        config.validate()?;
        Ok(config)
    }

    fn from_toml_config(toml_config: TomlConfig) -> Self {
        let service = toml_config.service;
        let defaults = Thresholds::default();
        let raw = toml_config.thresholds;

        let thresholds = Thresholds {
            proportion: raw.proportion.unwrap_or(defaults.proportion),
            min_calls_time_wasting: raw.min_calls_time_wasting.unwrap_or(defaults.min_calls_time_wasting),
            min_calls_n_plus_one: raw.min_calls_n_plus_one.unwrap_or(defaults.min_calls_n_plus_one),
            sigma_factor: raw.sigma_factor.unwrap_or(defaults.sigma_factor),
            max_merge_rounds: raw.max_merge_rounds.unwrap_or(defaults.max_merge_rounds),
            recursion_call_budget: raw.recursion_call_budget.or(defaults.recursion_call_budget),
        };

        let logging = match toml_config.logging {
            Some(log) => {
                let defaults = LoggingConfig::default();
                LoggingConfig {
                    log_dir: log.log_dir.map(PathBuf::from).unwrap_or(defaults.log_dir),
                    level_filter: log.level_filter.unwrap_or(defaults.level_filter),
                    rotation: log.rotation.unwrap_or(defaults.rotation),
                    retention_days: log.retention_days.unwrap_or(defaults.retention_days),
                }
            }
            None => LoggingConfig::default(),
        };

        Self {
            service: ServiceConfig {
                session_workers: service.session_workers.unwrap_or_else(num_cpus::get),
                queue_capacity: service.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
                enqueue_timeout_ms: service.enqueue_timeout_ms.unwrap_or(DEFAULT_ENQUEUE_TIMEOUT_MS),
                enqueue_attempts: service.enqueue_attempts.unwrap_or(DEFAULT_ENQUEUE_ATTEMPTS),
                result_capacity: service.result_capacity.unwrap_or(DEFAULT_RESULT_CAPACITY),
            },
            baseline: raw.baseline.unwrap_or(DEFAULT_BASELINE),
            thresholds,
            trace_dir: PathBuf::from(service.trace_dir.unwrap_or_else(|| DEFAULT_TRACE_DIR.to_string())),
            logging,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.session_workers == 0 {
            return Err(ConfigError::Invalid("service.session_workers must be at least 1".to_string()));
        }
        if self.service.queue_capacity == 0 {
            return Err(ConfigError::Invalid("service.queue_capacity must be at least 1".to_string()));
        }
        if self.service.enqueue_attempts == 0 {
            return Err(ConfigError::Invalid("service.enqueue_attempts must be at least 1".to_string()));
        }
        if !(self.baseline > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "thresholds.baseline must be positive, got {}",
                self.baseline
            )));
        }
        let proportion = self.thresholds.proportion;
        if !(proportion > 0.0 && proportion <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "thresholds.proportion must be in (0, 1], got {}",
                proportion
            )));
        }
        if !(self.thresholds.sigma_factor >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "thresholds.sigma_factor must not be negative, got {}",
                self.thresholds.sigma_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::DEFAULT_PROPORTION;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = DiagnosisConfig::from_toml_str("").unwrap();
        assert_eq!(config.baseline, DEFAULT_BASELINE);
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.service.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.service.session_workers, num_cpus::get());
        assert_eq!(config.trace_dir, PathBuf::from(DEFAULT_TRACE_DIR));
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[service]
session_workers = 2
queue_capacity = 8
enqueue_timeout_ms = 10
trace_dir = "/tmp/traces"

[thresholds]
baseline = 250.0
min_calls_n_plus_one = 5
recursion_call_budget = 64

[logging]
rotation = "hourly"
retention_days = 3
"#,
        )
        .unwrap();

        let config = DiagnosisConfig::from_toml(&path).unwrap();
        assert_eq!(config.service.session_workers, 2);
        assert_eq!(config.service.queue_capacity, 8);
        assert_eq!(config.service.enqueue_timeout_ms, 10);
        assert_eq!(config.service.enqueue_attempts, DEFAULT_ENQUEUE_ATTEMPTS);
        assert_eq!(config.baseline, 250.0);
        assert_eq!(config.thresholds.min_calls_n_plus_one, 5);
        assert_eq!(config.thresholds.proportion, DEFAULT_PROPORTION);
        assert_eq!(config.thresholds.recursion_call_budget, Some(64));
        assert_eq!(config.trace_dir, PathBuf::from("/tmp/traces"));
        assert_eq!(config.logging.rotation, LogRotation::Hourly);
        assert_eq!(config.logging.retention_days, 3);
        assert_eq!(config.logging.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for content in [
            "[service]\nsession_workers = 0",
            "[service]\nqueue_capacity = 0",
            "[thresholds]\nproportion = 1.5",
            "[thresholds]\nbaseline = -1.0",
        ] {
            let result = DiagnosisConfig::from_toml_str(content);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{content}");
        }
    }

    #[test]
    fn test_missing_file_and_bad_syntax() {
        let temp_dir = TempDir::new().unwrap();
        let missing = DiagnosisConfig::from_toml(temp_dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));

        let broken = DiagnosisConfig::from_toml_str("[service\nqueue_capacity = 1");
        assert!(matches!(broken, Err(ConfigError::Parse(_))));

        let weekly = DiagnosisConfig::from_toml_str("[logging]\nrotation = \"weekly\"");
        assert!(matches!(weekly, Err(ConfigError::Parse(_))));
    }
}
