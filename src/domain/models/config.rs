//! Harness configuration model.
//!
//! Loaded hierarchically by `infrastructure::config::ConfigLoader`
//! (defaults, then YAML files, then `MEMHARNESS_*` environment
//! variables).

use serde::{Deserialize, Serialize};

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model-provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Outbound-call pacing shared by every session in the process
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Per-failure-class backoff for transient provider errors
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Session-protocol knobs (bootstrap, close, validation bounds)
    #[serde(default)]
    pub session: SessionConfig,

    /// Memory-service endpoint settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model identifier sent with every turn request
    pub model: String,

    /// Base URL for the provider API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-20241022".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Pacing settings: at most one outbound provider call per interval,
/// process-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Minimum spacing between outbound provider calls, in seconds.
    /// The 15s default keeps a multi-session run near 4 requests/minute,
    /// comfortably under provider quotas.
    pub interval_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self { interval_secs: 15.0 }
    }
}

/// One backoff class: starting delay doubling up to a cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffClassConfig {
    /// First retry delay in seconds
    pub initial_secs: u64,

    /// Delay cap in seconds
    pub max_secs: u64,
}

/// Backoff settings for the two retryable provider failure classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Capacity-overload class (HTTP 529/500)
    pub overload: BackoffClassConfig,

    /// Throughput-limit class (HTTP 429)
    pub throttle: BackoffClassConfig,

    /// Hard wall-clock cap, in seconds, on the total retry window of a
    /// single provider call. Computed once per call, never per attempt.
    pub deadline_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            overload: BackoffClassConfig {
                initial_secs: 60,
                max_secs: 300,
            },
            throttle: BackoffClassConfig {
                initial_secs: 60,
                max_secs: 600,
            },
            deadline_secs: 600,
        }
    }
}

/// Session-protocol knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Mandated page size for the bootstrap entry listing
    pub entry_page_size: u32,

    /// Asset ids the model must download before bootstrap is complete
    pub required_assets: Vec<String>,

    /// Maximum assistant turns the session closer will spend
    pub close_max_turns: u32,

    /// Maximum synthetic polling turns while waiting for bootstrap
    pub bootstrap_max_polls: u32,

    /// Upper bound on `add_entry` summary length, in characters
    pub summary_max_chars: usize,

    /// Default response-size budget per turn, in tokens
    pub default_budget: u32,

    /// Budget increase applied on each continuation re-issue
    pub continuation_increment: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entry_page_size: 10,
            required_assets: vec!["ctx_rules".to_string()],
            close_max_turns: 10,
            bootstrap_max_polls: 8,
            summary_max_chars: 512,
            default_budget: 2000,
            continuation_increment: 512,
        }
    }
}

/// Memory-service endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Base URL for the memory-service HTTP API
    pub base_url: String,

    /// Vault the benchmark memories live in
    pub vault_id: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11545".to_string(),
            vault_id: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn, error
    pub level: String,

    /// Output format: json or pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
