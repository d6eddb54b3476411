use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid pacing interval: {0}. Must be non-negative")]
    InvalidPacingInterval(f64),

    #[error("Invalid entry_page_size: {0}. Must be at least 1")]
    InvalidPageSize(u32),

    #[error("Invalid close_max_turns: {0}. Must be at least 1")]
    InvalidCloseTurns(u32),

    #[error("Invalid summary_max_chars: {0}. Must be at least 1")]
    InvalidSummaryBound(usize),

    #[error("Invalid default_budget: {0}. Must be at least 1")]
    InvalidBudget(u32),

    #[error(
        "Invalid backoff configuration for {class}: initial_secs ({initial}) must not exceed max_secs ({max})"
    )]
    InvalidBackoff {
        class: &'static str,
        initial: u64,
        max: u64,
    },

    #[error("Invalid backoff deadline: {0}. Must be positive")]
    InvalidDeadline(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Memory base_url cannot be empty")]
    EmptyMemoryUrl,

    #[error("Provider base_url cannot be empty")]
    EmptyProviderUrl,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .memharness/config.yaml (project config)
    /// 3. .memharness/local.yaml (project local overrides, optional)
    /// 4. Environment variables (MEMHARNESS_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".memharness/config.yaml"))
            .merge(Yaml::file(".memharness/local.yaml"))
            .merge(Env::prefixed("MEMHARNESS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("MEMHARNESS_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.provider.base_url.is_empty() {
            return Err(ConfigError::EmptyProviderUrl);
        }

        if config.memory.base_url.is_empty() {
            return Err(ConfigError::EmptyMemoryUrl);
        }

        if config.pacing.interval_secs < 0.0 || !config.pacing.interval_secs.is_finite() {
            return Err(ConfigError::InvalidPacingInterval(
                config.pacing.interval_secs,
            ));
        }

        if config.session.entry_page_size == 0 {
            return Err(ConfigError::InvalidPageSize(config.session.entry_page_size));
        }

        if config.session.close_max_turns == 0 {
            return Err(ConfigError::InvalidCloseTurns(
                config.session.close_max_turns,
            ));
        }

        if config.session.summary_max_chars == 0 {
            return Err(ConfigError::InvalidSummaryBound(
                config.session.summary_max_chars,
            ));
        }

        if config.session.default_budget == 0 {
            return Err(ConfigError::InvalidBudget(config.session.default_budget));
        }

        for (class, cfg) in [
            ("overload", &config.backoff.overload),
            ("throttle", &config.backoff.throttle),
        ] {
            if cfg.initial_secs > cfg.max_secs {
                return Err(ConfigError::InvalidBackoff {
                    class,
                    initial: cfg.initial_secs,
                    max: cfg.max_secs,
                });
            }
        }

        if config.backoff.deadline_secs == 0 {
            return Err(ConfigError::InvalidDeadline(config.backoff.deadline_secs));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_validate_zero_page_size() {
        let mut config = Config::default();
        config.session.entry_page_size = 0;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidPageSize(0)
        ));
    }

    #[test]
    fn test_validate_zero_close_turns() {
        let mut config = Config::default();
        config.session.close_max_turns = 0;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidCloseTurns(0)
        ));
    }

    #[test]
    fn test_validate_negative_pacing() {
        let mut config = Config::default();
        config.pacing.interval_secs = -1.0;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidPacingInterval(_)
        ));
    }

    #[test]
    fn test_validate_inverted_backoff() {
        let mut config = Config::default();
        config.backoff.throttle.initial_secs = 900;
        config.backoff.throttle.max_secs = 600;

        let result = ConfigLoader::validate(&config);
        match result.unwrap_err() {
            ConfigError::InvalidBackoff {
                class,
                initial,
                max,
            } => {
                assert_eq!(class, "throttle");
                assert_eq!(initial, 900);
                assert_eq!(max, 600);
            }
            other => panic!("Expected InvalidBackoff, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        let result = ConfigLoader::validate(&config);
        match result.unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_empty_memory_url() {
        let mut config = Config::default();
        config.memory.base_url = String::new();

        let result = ConfigLoader::validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::EmptyMemoryUrl));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "pacing:\n  interval_secs: 5.0\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(
            override_file,
            "pacing:\n  interval_secs: 0.5\nlogging:\n  level: debug"
        )
        .unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert!(
            (config.pacing.interval_secs - 0.5).abs() < f64::EPSILON,
            "Override should win"
        );
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}
