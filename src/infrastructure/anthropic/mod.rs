//! Anthropic Messages API integration
//!
//! HTTP adapter implementing the `ModelProvider` port:
//! - Single-request client (pacing and backoff handled by the caller)
//! - Status-code classification into retry classes
//! - Wire-type mapping onto the domain content model

pub mod client;
pub mod error;
pub mod types;

pub use client::AnthropicClient;
pub use error::classify_status;
