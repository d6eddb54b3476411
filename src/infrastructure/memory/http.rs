/// HTTP adapter for the remote memory service
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::domain::models::MemoryConfig;
use crate::domain::ports::{EntryDraft, EntryRecord, MemoryError, MemoryService, SearchResults};

#[derive(Debug, Deserialize)]
struct CreatedMemory {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ContextDocument {
    #[serde(default)]
    context: String,
}

#[derive(Debug, Default, Deserialize)]
struct EntryPage {
    #[serde(default)]
    entries: Vec<EntryRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetListing {
    #[serde(default)]
    assets: Vec<String>,
}

/// REST client for the memory service.
///
/// All memory routes are vault-scoped; assets are service-global.
pub struct HttpMemoryService {
    http_client: ReqwestClient,
    base_url: String,
    vault_id: String,
}

impl HttpMemoryService {
    pub fn new(config: &MemoryConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            vault_id: config.vault_id.clone(),
        })
    }

    fn memory_url(&self, memory_id: &str, suffix: &str) -> String {
        format!(
            "{}/v0/vaults/{}/memories/{}{}",
            self.base_url, self.vault_id, memory_id, suffix
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, MemoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(MemoryError::Backend(format!("{status}: {body}")))
    }
}

fn network(e: reqwest::Error) -> MemoryError {
    MemoryError::Network(e.to_string())
}

fn decode(e: reqwest::Error) -> MemoryError {
    MemoryError::Backend(format!("Undecodable response body: {e}"))
}

#[async_trait]
impl MemoryService for HttpMemoryService {
    #[instrument(skip(self, description))]
    async fn create_memory(
        &self,
        title: &str,
        memory_type: &str,
        description: &str,
    ) -> Result<String, MemoryError> {
        let response = self
            .http_client
            .post(format!(
                "{}/v0/vaults/{}/memories",
                self.base_url, self.vault_id
            ))
            .json(&json!({
                "title": title,
                "memoryType": memory_type,
                "description": description,
            }))
            .send()
            .await
            .map_err(network)?;

        let created: CreatedMemory = Self::check(response).await?.json().await.map_err(decode)?;
        debug!(memory_id = %created.id, "Created memory");
        Ok(created.id)
    }

    async fn get_context(&self, memory_id: &str) -> Result<String, MemoryError> {
        let response = self
            .http_client
            .get(self.memory_url(memory_id, "/contexts"))
            .send()
            .await
            .map_err(network)?;

        let doc: ContextDocument = Self::check(response).await?.json().await.map_err(decode)?;
        Ok(doc.context)
    }

    async fn list_entries(
        &self,
        memory_id: &str,
        limit: u32,
    ) -> Result<Vec<EntryRecord>, MemoryError> {
        let response = self
            .http_client
            .get(self.memory_url(memory_id, "/entries"))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(network)?;

        let page: EntryPage = Self::check(response).await?.json().await.map_err(decode)?;
        Ok(page.entries)
    }

    async fn add_entry(&self, memory_id: &str, entry: EntryDraft) -> Result<(), MemoryError> {
        let response = self
            .http_client
            .post(self.memory_url(memory_id, "/entries"))
            .json(&entry)
            .send()
            .await
            .map_err(network)?;

        Self::check(response).await.map(|_| ())
    }

    async fn put_context(&self, memory_id: &str, content: &str) -> Result<(), MemoryError> {
        let response = self
            .http_client
            .put(self.memory_url(memory_id, "/contexts"))
            .json(&json!({ "context": content }))
            .send()
            .await
            .map_err(network)?;

        Self::check(response).await.map(|_| ())
    }

    async fn search(
        &self,
        memory_id: &str,
        query: &str,
        top_k: u32,
    ) -> Result<SearchResults, MemoryError> {
        let response = self
            .http_client
            .post(format!("{}/v0/search", self.base_url))
            .json(&json!({
                "vaultId": self.vault_id,
                "memoryId": memory_id,
                "query": query,
                "topK": top_k,
            }))
            .send()
            .await
            .map_err(network)?;

        Self::check(response).await?.json().await.map_err(decode)
    }

    async fn await_consistency(&self, memory_id: &str) -> Result<(), MemoryError> {
        let response = self
            .http_client
            .post(self.memory_url(memory_id, "/consistency"))
            .send()
            .await
            .map_err(network)?;

        Self::check(response).await.map(|_| ())
    }

    async fn list_assets(&self) -> Result<Vec<String>, MemoryError> {
        let response = self
            .http_client
            .get(format!("{}/v0/assets", self.base_url))
            .send()
            .await
            .map_err(network)?;

        let listing: AssetListing = Self::check(response).await?.json().await.map_err(decode)?;
        Ok(listing.assets)
    }

    async fn get_asset(&self, asset_id: &str) -> Result<String, MemoryError> {
        let response = self
            .http_client
            .get(format!("{}/v0/assets/{}", self.base_url, asset_id))
            .send()
            .await
            .map_err(network)?;

        if response.status().as_u16() == 404 {
            return Err(MemoryError::AssetMissing(asset_id.to_string()));
        }

        Self::check(response)
            .await?
            .text()
            .await
            .map_err(|e| MemoryError::Backend(format!("Unreadable asset body: {e}")))
    }
}
