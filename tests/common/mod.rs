//! Shared test doubles for the session-engine integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use memharness::domain::ports::{
    ContentBlock, EntryDraft, EntryRecord, MemoryError, MemoryService, ModelProvider,
    ProviderError, SearchResults, StopSignal, TurnRequest, TurnResponse,
};

/// Provider double that replays a fixed script of responses and
/// records every request it received.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<TurnResponse, ProviderError>>>,
    pub requests: Mutex<Vec<TurnRequest>>,
    pub call_times: Mutex<Vec<Instant>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<TurnResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request_budgets(&self) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.max_tokens)
            .collect()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: TurnRequest) -> Result<TurnResponse, ProviderError> {
        self.call_times.lock().unwrap().push(Instant::now());
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider script exhausted")
    }
}

/// Response helpers for building scripts.
pub fn text_response(text: &str) -> Result<TurnResponse, ProviderError> {
    Ok(TurnResponse {
        content: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
        stop: StopSignal::EndTurn,
    })
}

pub fn blocks_response(
    blocks: Vec<ContentBlock>,
    stop: StopSignal,
) -> Result<TurnResponse, ProviderError> {
    Ok(TurnResponse {
        content: blocks,
        stop,
    })
}

pub fn tool_use(id: &str, name: &str, input: Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: Some(id.to_string()),
        name: name.to_string(),
        input,
    }
}

/// Memory-service double that records writes and serves canned assets.
#[derive(Default)]
pub struct RecordingMemory {
    pub entries: Mutex<Vec<(String, EntryDraft)>>,
    pub contexts: Mutex<Vec<(String, String)>>,
    pub listed_limits: Mutex<Vec<u32>>,
    pub assets: HashMap<String, String>,
    pub consistency_fails: bool,
}

impl RecordingMemory {
    pub fn with_assets(assets: &[(&str, &str)]) -> Self {
        Self {
            assets: assets
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_failing_consistency() -> Self {
        Self {
            consistency_fails: true,
            ..Self::default()
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl MemoryService for RecordingMemory {
    async fn create_memory(
        &self,
        _title: &str,
        _memory_type: &str,
        _description: &str,
    ) -> Result<String, MemoryError> {
        Ok("3c9e1a77-42bd-4f7e-9a6d-8e5b2c1d0f4a".to_string())
    }

    async fn get_context(&self, _memory_id: &str) -> Result<String, MemoryError> {
        Ok("existing context".to_string())
    }

    async fn list_entries(
        &self,
        _memory_id: &str,
        limit: u32,
    ) -> Result<Vec<EntryRecord>, MemoryError> {
        self.listed_limits.lock().unwrap().push(limit);
        Ok(Vec::new())
    }

    async fn add_entry(&self, memory_id: &str, entry: EntryDraft) -> Result<(), MemoryError> {
        self.entries
            .lock()
            .unwrap()
            .push((memory_id.to_string(), entry));
        Ok(())
    }

    async fn put_context(&self, memory_id: &str, content: &str) -> Result<(), MemoryError> {
        self.contexts
            .lock()
            .unwrap()
            .push((memory_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn search(
        &self,
        _memory_id: &str,
        _query: &str,
        _top_k: u32,
    ) -> Result<SearchResults, MemoryError> {
        Ok(SearchResults::default())
    }

    async fn await_consistency(&self, _memory_id: &str) -> Result<(), MemoryError> {
        if self.consistency_fails {
            return Err(MemoryError::Backend(
                "consistency barrier unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_assets(&self) -> Result<Vec<String>, MemoryError> {
        Ok(self.assets.keys().cloned().collect())
    }

    async fn get_asset(&self, asset_id: &str) -> Result<String, MemoryError> {
        self.assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| MemoryError::AssetMissing(asset_id.to_string()))
    }
}
