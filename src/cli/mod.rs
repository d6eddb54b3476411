//! Command-line interface.
//!
//! Thin process wiring: builds the adapters, seeds one session, and
//! replays a scripted transcript through the engine. Dataset schema
//! handling and scoring live outside this crate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::models::Config;
use crate::domain::ports::ToolSpec;
use crate::infrastructure::anthropic::AnthropicClient;
use crate::infrastructure::memory::HttpMemoryService;
use crate::services::{RequestPacer, SessionOptions, SessionRunner};

#[derive(Parser)]
#[command(
    name = "memharness",
    about = "Replays scripted conversations against a model provider to exercise a memory service",
    version
)]
pub struct Cli {
    /// Configuration file (otherwise .memharness/config.yaml hierarchy)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay one scripted conversation into a memory
    Ingest(IngestArgs),
}

#[derive(Args)]
pub struct IngestArgs {
    /// Transcript JSON file: an array of {role, content} turns
    #[arg(long)]
    pub transcript: PathBuf,

    /// Pre-provisioned memory id the session writes into; omit to let
    /// the model create one via create_memory
    #[arg(long)]
    pub memory_id: Option<String>,

    /// Provider API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// File holding the system prompt for the session
    #[arg(long)]
    pub system_prompt: Option<PathBuf>,

    /// Truncate the transcript to the first N turns
    #[arg(long)]
    pub max_messages: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub content: String,
}

pub async fn execute_ingest(args: IngestArgs, config: Config) -> Result<()> {
    let provider = Arc::new(AnthropicClient::new(args.api_key, &config.provider)?);
    let memory = Arc::new(HttpMemoryService::new(&config.memory)?);
    let pacer = Arc::new(RequestPacer::from_secs_f64(config.pacing.interval_secs));

    let mut opts = SessionOptions::from_config(&config);
    opts.tool_schema = builtin_tool_schema();
    opts.default_memory_id = args.memory_id;
    if let Some(path) = &args.system_prompt {
        let prompt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        opts.system_prompt = Some(prompt);
    }

    let raw = std::fs::read_to_string(&args.transcript).with_context(|| {
        format!(
            "Failed to read transcript from {}",
            args.transcript.display()
        )
    })?;
    let turns: Vec<TranscriptTurn> =
        serde_json::from_str(&raw).context("Transcript is not a JSON array of {role, content}")?;

    let mut session = SessionRunner::new(provider, memory, pacer, opts);

    session.step("control:test_harness BOOTSTRAP").await?;
    session.await_bootstrap().await?;
    info!("Bootstrap complete, streaming transcript");

    let limit = args.max_messages.unwrap_or(usize::MAX);
    for (idx, turn) in turns.into_iter().take(limit).enumerate() {
        if turn.content.trim().is_empty() {
            warn!(idx, role = %turn.role, "Skipping empty turn");
            continue;
        }
        let message = format!("benchmark_conversation:{} {}", turn.role, turn.content);
        session.step(&message).await?;
    }

    let reply = session.close_session().await?;
    info!(reply = %reply, "Session closed");
    Ok(())
}

/// Tool schema advertised to the model.
///
/// Mirrors the memory-service tool contract; descriptions stay short
/// since the governance rules arrive via the `ctx_rules` asset.
pub fn builtin_tool_schema() -> Vec<ToolSpec> {
    fn tool(name: &str, description: &str, schema: serde_json::Value) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema,
        }
    }

    vec![
        tool(
            "create_memory",
            "Create a new memory and return its id",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "memory_type": {"type": "string"},
                    "description": {"type": "string"}
                },
                "required": ["title"]
            }),
        ),
        tool(
            "get_context",
            "Fetch the current working-context document",
            json!({
                "type": "object",
                "properties": {"memory_id": {"type": "string"}}
            }),
        ),
        tool(
            "list_entries",
            "List the most recent stored entries",
            json!({
                "type": "object",
                "properties": {
                    "memory_id": {"type": "string"},
                    "limit": {"type": "integer"}
                }
            }),
        ),
        tool(
            "add_entry",
            "Persist one dialogue entry with a bounded summary and role tag",
            json!({
                "type": "object",
                "properties": {
                    "memory_id": {"type": "string"},
                    "raw_entry": {"type": "string"},
                    "summary": {"type": "string"},
                    "role": {"type": "string"},
                    "tags": {"type": "object"}
                },
                "required": ["raw_entry", "summary"]
            }),
        ),
        tool(
            "put_context",
            "Replace the working-context document",
            json!({
                "type": "object",
                "properties": {
                    "memory_id": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["content"]
            }),
        ),
        tool(
            "search_memories",
            "Semantic search over stored entries",
            json!({
                "type": "object",
                "properties": {
                    "memory_id": {"type": "string"},
                    "query": {"type": "string"},
                    "top_k": {"type": "integer"}
                },
                "required": ["query"]
            }),
        ),
        tool(
            "await_consistency",
            "Block until pending writes are visible to reads",
            json!({
                "type": "object",
                "properties": {"memory_id": {"type": "string"}}
            }),
        ),
        tool(
            "get_user",
            "Fetch the active user profile",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "get_memory",
            "Fetch memory metadata",
            json!({
                "type": "object",
                "properties": {"memory_id": {"type": "string"}}
            }),
        ),
        tool(
            "list_assets",
            "List available static reference assets",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "get_asset",
            "Download one static reference asset by id",
            json!({
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "required": ["id"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schema_covers_the_tool_set() {
        let schema = builtin_tool_schema();
        let names: Vec<&str> = schema.iter().map(|t| t.name.as_str()).collect();
        for expected in [
            "create_memory",
            "get_context",
            "list_entries",
            "add_entry",
            "put_context",
            "search_memories",
            "await_consistency",
            "list_assets",
            "get_asset",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[test]
    fn test_transcript_turn_parsing() {
        let turns: Vec<TranscriptTurn> = serde_json::from_str(
            r#"[{"role": "speaker_1", "content": "hi"}, {"role": "speaker_2", "content": "hello"}]"#,
        )
        .unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "speaker_1");
    }
}
