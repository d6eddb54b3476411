//! Remote memory-service port.
//!
//! Mirrors the tool surface exposed to the model. The HTTP adapter in
//! `infrastructure::memory` implements this against the REST API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One stored conversation entry, as returned by listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    #[serde(default)]
    pub raw_entry: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub role: String,
}

/// A validated entry ready for ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    pub raw_entry: String,
    pub summary: String,
    pub role: String,
    pub tags: BTreeMap<String, serde_json::Value>,
}

/// Search response: matching entries plus context snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_context: Option<String>,
}

/// Memory-service failures.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Memory backend error: {0}")]
    Backend(String),

    #[error("Asset not found: {0}")]
    AssetMissing(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Async interface to the remote memory store.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Create a memory and return its id.
    async fn create_memory(
        &self,
        title: &str,
        memory_type: &str,
        description: &str,
    ) -> Result<String, MemoryError>;

    /// Fetch the current working-context document.
    async fn get_context(&self, memory_id: &str) -> Result<String, MemoryError>;

    /// List the most recent entries, newest first.
    async fn list_entries(
        &self,
        memory_id: &str,
        limit: u32,
    ) -> Result<Vec<EntryRecord>, MemoryError>;

    /// Enqueue one entry for ingestion.
    async fn add_entry(&self, memory_id: &str, entry: EntryDraft) -> Result<(), MemoryError>;

    /// Replace the working-context document.
    async fn put_context(&self, memory_id: &str, content: &str) -> Result<(), MemoryError>;

    /// Semantic search over stored entries.
    async fn search(
        &self,
        memory_id: &str,
        query: &str,
        top_k: u32,
    ) -> Result<SearchResults, MemoryError>;

    /// Block until pending writes are visible to reads.
    async fn await_consistency(&self, memory_id: &str) -> Result<(), MemoryError>;

    /// List available asset ids.
    async fn list_assets(&self) -> Result<Vec<String>, MemoryError>;

    /// Download one asset body.
    async fn get_asset(&self, asset_id: &str) -> Result<String, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_record_backend_casing() {
        let record: EntryRecord = serde_json::from_value(json!({
            "rawEntry": "hello there",
            "summary": "greeting",
            "role": "speaker_1",
        }))
        .unwrap();
        assert_eq!(record.raw_entry, "hello there");
        assert_eq!(record.role, "speaker_1");
    }

    #[test]
    fn test_entry_draft_serializes_camel_case() {
        let mut tags = BTreeMap::new();
        tags.insert("role".to_string(), json!("speaker_2"));
        let draft = EntryDraft {
            raw_entry: "raw".to_string(),
            summary: "sum".to_string(),
            role: "speaker_2".to_string(),
            tags,
        };
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["rawEntry"], "raw");
        assert_eq!(value["tags"]["role"], "speaker_2");
    }

    #[test]
    fn test_search_results_tolerate_missing_snapshots() {
        let results: SearchResults = serde_json::from_value(json!({
            "entries": [{"rawEntry": "x", "summary": "y", "role": "speaker_1"}],
        }))
        .unwrap();
        assert_eq!(results.entries.len(), 1);
        assert!(results.latest_context.is_none());
        assert!(results.best_context.is_none());
    }
}
