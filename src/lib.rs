//! Memharness - memory-service benchmark session engine
//!
//! Memharness replays scripted conversations against a language-model
//! provider to exercise a remote memory-storage service through a fixed
//! set of tool operations. Its core is the session protocol engine:
//! per-turn driving, a mandatory bootstrap gate, tool multiplexing,
//! bounded backoff for transient provider failures, and a termination
//! protocol that guarantees a final durable snapshot or a loud failure.
//!
//! # Architecture
//!
//! The crate follows Hexagonal Architecture:
//!
//! - **Domain Layer** (`domain`): configuration model and port traits
//! - **Service Layer** (`services`): the session protocol engine
//! - **Infrastructure Layer** (`infrastructure`): provider and
//!   memory-service HTTP adapters, configuration loading
//! - **CLI Layer** (`cli`): command-line wiring

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{Config, LoggingConfig, MemoryConfig, PacingConfig, ProviderConfig};
pub use domain::ports::{
    ChatMessage, ContentBlock, MemoryError, MemoryService, MessageContent, ModelProvider,
    ProviderError, StopSignal, ToolSpec, TurnRequest, TurnResponse,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    BootstrapTracker, EngineError, RequestPacer, SessionOptions, SessionRunner, ToolInvocation,
};
