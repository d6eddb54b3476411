pub mod config;

pub use config::{
    BackoffClassConfig, BackoffConfig, Config, LoggingConfig, MemoryConfig, PacingConfig,
    ProviderConfig, SessionConfig,
};
