/// Anthropic Messages API adapter
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use tracing::{debug, instrument};

use super::error::classify_status;
use super::types::WireResponse;
use crate::domain::models::ProviderConfig;
use crate::domain::ports::{ModelProvider, ProviderError, TurnRequest, TurnResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// HTTP client for the Anthropic Messages API.
///
/// Pacing and backoff live above this adapter in the session engine;
/// the client does exactly one request per `complete` call and
/// classifies failures so the caller can pick a retry schedule.
pub struct AnthropicClient {
    /// Reusable HTTP client with connection pooling
    http_client: ReqwestClient,

    /// API key for authentication
    api_key: String,

    /// Base URL for the API
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, config: &ProviderConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ModelProvider for AnthropicClient {
    #[instrument(skip(self, request), fields(model = %request.model, max_tokens = request.max_tokens))]
    async fn complete(&self, request: TurnRequest) -> Result<TurnResponse, ProviderError> {
        debug!(messages = request.messages.len(), "Sending turn request");

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(classify_status(status.as_u16(), body));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        Ok(TurnResponse::from(wire))
    }
}
