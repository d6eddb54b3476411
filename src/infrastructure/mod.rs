//! Infrastructure layer (adapters)
//!
//! Concrete implementations of the domain ports:
//! - anthropic: Messages API model provider
//! - memory: memory-service REST client
//! - config: hierarchical configuration loading

pub mod anthropic;
pub mod config;
pub mod memory;
