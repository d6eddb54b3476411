//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - ModelProvider: language-model provider turn requests
//! - MemoryService: remote memory-storage tool contract
//!
//! These traits define the contracts that allow the session engine to be
//! independent of specific transport implementations.

pub mod memory_service;
pub mod model_provider;

pub use memory_service::{EntryDraft, EntryRecord, MemoryError, MemoryService, SearchResults};
pub use model_provider::{
    ChatMessage, ContentBlock, LimitType, MessageContent, ModelProvider, ProviderError,
    StopSignal, ToolSpec, TurnRequest, TurnResponse,
};
