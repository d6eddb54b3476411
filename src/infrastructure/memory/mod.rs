//! Memory-service HTTP integration
//!
//! REST adapter implementing the `MemoryService` port against the
//! vault-scoped memory API.

pub mod http;

pub use http::HttpMemoryService;
