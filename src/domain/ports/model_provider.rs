//! Language-model provider port.
//!
//! The session engine talks to the model through this trait only. The
//! concrete wire adapter lives in `infrastructure::anthropic`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message in the running conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Message content: either a plain string or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One structured content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        content: String,
    },
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One provider turn request.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSignal {
    EndTurn,
    MaxTokens,
    ToolUse,
    /// The provider parked the turn mid-flight; the identical request
    /// must be re-issued to collect the remainder.
    #[serde(rename = "pause_turn")]
    NeedsContinuation,
    #[serde(other)]
    Other,
}

/// One provider turn response.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnResponse {
    pub content: Vec<ContentBlock>,
    pub stop: StopSignal,
}

/// Which quota a throttle response exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    Tokens,
    Requests,
    Unknown,
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tokens => write!(f, "tokens"),
            Self::Requests => write!(f, "requests"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Provider-side failures, classified for retry handling.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider overloaded: {0}")]
    Overloaded(String),

    #[error("Provider throttled ({limit_type} limit): {message}")]
    Throttled {
        limit_type: LimitType,
        message: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}

impl ProviderError {
    /// Capacity-overload class, retried with the shorter delay cap.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Overloaded(_))
    }

    /// Throughput-limit class, retried with the longer delay cap.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

/// Async interface for a single model turn.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: TurnRequest) -> Result<TurnResponse, ProviderError>;
}
