//! Tool dispatcher.
//!
//! Maps model-issued tool invocations onto the memory-service port and
//! records normalized results for echoing back into the conversation.
//! Invocations are a tagged enum over the fixed tool set; names outside
//! it parse to `Unknown` and are ignored for forward compatibility.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use crate::domain::ports::EntryDraft;
use crate::services::error::EngineError;
use crate::services::session::SessionRunner;

const ALLOWED_ROLES: [&str; 2] = ["speaker_1", "speaker_2"];

/// Backend replicas need a moment before a freshly created memory
/// serves its default context row.
const CREATE_SETTLE: Duration = Duration::from_millis(300);

/// Fallback settle delay when the durability barrier itself errors.
const CONSISTENCY_FALLBACK_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Deserialize)]
pub struct AddEntryArgs {
    #[serde(default)]
    pub memory_id: Option<String>,
    #[serde(default)]
    pub raw_entry: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tags: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PutContextArgs {
    #[serde(default)]
    pub memory_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEntriesArgs {
    #[serde(default)]
    pub memory_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchArgs {
    #[serde(default)]
    pub memory_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub top_k: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateMemoryArgs {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryRefArgs {
    #[serde(default)]
    pub memory_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetAssetArgs {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
}

impl GetAssetArgs {
    /// Either argument spelling is accepted.
    pub fn resolved(&self) -> Option<String> {
        self.id.clone().or_else(|| self.asset_id.clone())
    }
}

/// One model-issued tool invocation with typed arguments.
#[derive(Debug)]
pub enum ToolInvocation {
    AddEntry(AddEntryArgs),
    PutContext(PutContextArgs),
    ListEntries(ListEntriesArgs),
    SearchMemories(SearchArgs),
    CreateMemory(CreateMemoryArgs),
    GetContext(MemoryRefArgs),
    GetUser,
    GetMemory,
    AwaitConsistency(MemoryRefArgs),
    ListAssets,
    GetAsset(GetAssetArgs),
    Unknown(String),
}

impl ToolInvocation {
    /// Parse a tool name and its JSON input into a typed invocation.
    ///
    /// Malformed argument objects degrade to defaults rather than
    /// failing the parse; per-field validation happens in the
    /// handlers where an advisory turn can be issued.
    pub fn parse(name: &str, input: &Value) -> Self {
        fn args<T: DeserializeOwned + Default>(input: &Value) -> T {
            serde_json::from_value(input.clone()).unwrap_or_default()
        }

        match name {
            "add_entry" => Self::AddEntry(args(input)),
            "put_context" => Self::PutContext(args(input)),
            "list_entries" => Self::ListEntries(args(input)),
            "search_memories" => Self::SearchMemories(args(input)),
            "create_memory" => Self::CreateMemory(args(input)),
            "get_context" => Self::GetContext(args(input)),
            "get_user" => Self::GetUser,
            "get_memory" => Self::GetMemory,
            "await_consistency" => Self::AwaitConsistency(args(input)),
            "list_assets" => Self::ListAssets,
            "get_asset" => Self::GetAsset(args(input)),
            other => Self::Unknown(other.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::AddEntry(_) => "add_entry",
            Self::PutContext(_) => "put_context",
            Self::ListEntries(_) => "list_entries",
            Self::SearchMemories(_) => "search_memories",
            Self::CreateMemory(_) => "create_memory",
            Self::GetContext(_) => "get_context",
            Self::GetUser => "get_user",
            Self::GetMemory => "get_memory",
            Self::AwaitConsistency(_) => "await_consistency",
            Self::ListAssets => "list_assets",
            Self::GetAsset(_) => "get_asset",
            Self::Unknown(name) => name,
        }
    }
}

impl SessionRunner {
    pub(crate) async fn dispatch(&mut self, invocation: ToolInvocation) -> Result<(), EngineError> {
        let tool = invocation.name().to_string();
        debug!(tool = %tool, "Dispatching tool call");

        let result = match invocation {
            ToolInvocation::AddEntry(args) => self.exec_add_entry(args).await,
            ToolInvocation::PutContext(args) => self.exec_put_context(args).await,
            ToolInvocation::ListEntries(args) => self.exec_list_entries(args).await,
            ToolInvocation::SearchMemories(args) => self.exec_search_memories(args).await,
            ToolInvocation::CreateMemory(args) => self.exec_create_memory(args).await,
            ToolInvocation::GetContext(args) => self.exec_get_context(args).await,
            // Accepted no-ops: handled out-of-band today.
            ToolInvocation::GetUser | ToolInvocation::GetMemory => Ok(()),
            ToolInvocation::AwaitConsistency(args) => self.exec_await_consistency(args).await,
            ToolInvocation::ListAssets => self.exec_list_assets().await,
            ToolInvocation::GetAsset(args) => self.exec_get_asset(args).await,
            ToolInvocation::Unknown(name) => {
                debug!(tool = %name, "Ignoring unknown tool name");
                Ok(())
            }
        };

        if let Err(e) = &result {
            error!(tool = %tool, error = %e, "Tool call failed");
        }
        result
    }

    async fn exec_add_entry(&mut self, args: AddEntryArgs) -> Result<(), EngineError> {
        let summary = match args.summary.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => {
                warn!("add_entry missing summary, requesting explanation");
                let probe = format!(
                    "You attempted to call `add_entry` without the required `summary` field. \
                     According to the tool schema (`add_entry.summary` is mandatory) and the \
                     project rules, each stored entry must include a <={}-char summary. \
                     Which instructions or rules did you rely on when constructing this \
                     incomplete tool call?",
                    self.opts.summary_max_chars
                );
                match self.advisory(&probe).await {
                    Ok(expl) => {
                        error!(explanation = %expl, "Model explanation for missing summary");
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to obtain explanation for missing summary");
                    }
                }
                return Err(EngineError::MissingField {
                    tool: "add_entry",
                    field: "summary",
                });
            }
        };

        let summary_len = summary.chars().count();
        if summary_len > self.opts.summary_max_chars {
            return Err(EngineError::SummaryTooLong {
                len: summary_len,
                max: self.opts.summary_max_chars,
            });
        }

        let raw_entry = match args.raw_entry {
            Some(r) if !r.is_empty() => r,
            _ => {
                return Err(EngineError::MissingField {
                    tool: "add_entry",
                    field: "raw_entry",
                });
            }
        };

        let mut tags = args.tags.unwrap_or_default();
        let mut role = args.role.filter(|r| !r.is_empty());
        if role.is_none() {
            role = tags
                .remove("role")
                .and_then(|v| v.as_str().map(str::to_string));
        }
        let mut role = match role {
            Some(r) => r,
            None => match self.infer_role_from_history() {
                Some(r) => r,
                None => {
                    return Err(EngineError::MissingField {
                        tool: "add_entry",
                        field: "role",
                    });
                }
            },
        };

        // Legacy two-word spelling normalizes to the canonical form.
        if role == "speaker 1" || role == "speaker 2" {
            role = role.replace(' ', "_");
            info!(role = %role, "Normalized legacy role tag");
        }

        if !ALLOWED_ROLES.contains(&role.as_str()) {
            warn!(role = %role, "Non-canonical role in add_entry, requesting retry");
            let probe = format!(
                "`add_entry.tags.role` must be one of [\"speaker_1\", \"speaker_2\"]. \
                 You sent '{role}'. Please resend the tool call with the canonical role value."
            );
            if let Err(e) = self.advisory(&probe).await {
                error!(error = %e, "Failed to obtain non-canonical role acknowledgement");
            }
            return Err(EngineError::NonCanonicalRole(role));
        }

        let memory_id = self.resolve_memory_id(args.memory_id.as_deref())?;

        // The backend expects the role mirrored inside tags.
        let mut tag_map: BTreeMap<String, Value> = tags.into_iter().collect();
        tag_map.insert("role".to_string(), json!(role.clone()));

        self.memory
            .add_entry(
                &memory_id,
                EntryDraft {
                    raw_entry,
                    summary,
                    role,
                    tags: tag_map,
                },
            )
            .await?;

        // Persisting before the bootstrap entry listing is an advisory
        // violation: one explanation probe, then continue.
        if self.bootstrap.context_fetched()
            && !self.bootstrap.entries_listed()
            && !self.persist_violation_asked
        {
            self.persist_violation_asked = true;
            warn!("add_entry issued before the bootstrap entry listing, requesting explanation");
            let probe = format!(
                "As part of the session bootstrap you must call `list_entries(limit={})` \
                 before storing new entries. You have just stored an entry without listing \
                 recent entries first. Why did you skip the required step?",
                self.opts.entry_page_size
            );
            match self.advisory(&probe).await {
                Ok(expl) => {
                    error!(explanation = %expl, "Model explanation for persist-before-list violation");
                }
                Err(e) => {
                    error!(error = %e, "Failed to obtain persist-before-list explanation");
                }
            }
        }

        Ok(())
    }

    async fn exec_put_context(&mut self, args: PutContextArgs) -> Result<(), EngineError> {
        // The backend rejects empty content; an empty document is
        // spelled as an empty JSON object.
        let content = args
            .content
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "{}".to_string());
        let memory_id = self.resolve_memory_id(args.memory_id.as_deref())?;

        debug!(memory_id = %memory_id, chars = content.len(), "Replacing working context");
        self.memory.put_context(&memory_id, &content).await?;
        self.last_snapshot_turn = self.turn_counter;

        if !self.bootstrap.assets_complete() && !self.asset_violation_asked {
            self.asset_violation_asked = true;
            let missing = self.bootstrap.missing_assets().join(", ");
            warn!(
                missing = %missing,
                "put_context issued before required assets were downloaded, requesting explanation"
            );
            let probe = format!(
                "You must download the required reference assets ({missing}) via get_asset \
                 before put_context. Why did you skip?"
            );
            match self.advisory(&probe).await {
                Ok(expl) => {
                    error!(explanation = %expl, "Model explanation for asset bootstrap violation");
                }
                Err(e) => {
                    error!(error = %e, "Failed to obtain asset bootstrap explanation");
                }
            }
        }

        if matches!(content.trim(), "" | "{}")
            && self.turn_counter > 5
            && !self.empty_context_asked
        {
            self.empty_context_asked = true;
            warn!("Empty context persisted deep into the session, requesting recap and reasoning");
            let recap = self
                .advisory(
                    "Please provide a concise summary (<=200 words) of the conversation so far \
                     between speaker 1 and speaker 2.",
                )
                .await;
            match recap {
                Ok(summary) => {
                    info!(summary = %summary, "Model conversation recap");
                    match self
                        .advisory(
                            "Given the recap you just provided, why did you persist an \
                             **empty** context document instead of a context that includes \
                             that information?",
                        )
                        .await
                    {
                        Ok(reason) => info!(reason = %reason, "Model reasoning for empty context"),
                        Err(e) => error!(error = %e, "Failed to obtain empty-context reasoning"),
                    }
                }
                Err(e) => error!(error = %e, "Failed to obtain conversation recap"),
            }
        }

        Ok(())
    }

    async fn exec_list_entries(&mut self, args: ListEntriesArgs) -> Result<(), EngineError> {
        let memory_id = self.resolve_memory_id(args.memory_id.as_deref())?;
        let mandated = self.opts.entry_page_size;
        let limit = args.limit.unwrap_or(mandated);

        if limit == mandated {
            self.bootstrap.record_entry_listing();
        } else {
            // Fatal violation: one explanation probe plus one
            // compliance-help probe, then the error propagates.
            error!(
                limit,
                expected = mandated,
                "list_entries called with a non-mandated page size"
            );
            let probe = format!(
                "You just issued `list_entries` with `limit = {limit}`, but the project rules \
                 specify `limit = {mandated}` on session bootstrap. Why did you deviate from \
                 the rule?"
            );
            match self.advisory(&probe).await {
                Ok(expl) => {
                    error!(explanation = %expl, "Model explanation for page-size violation");
                    let follow = format!(
                        "What additional information or clarity would help you follow the \
                         bootstrap rule (`list_entries(limit={mandated})` before any \
                         `add_entry`) in future sessions?"
                    );
                    match self.advisory(&follow).await {
                        Ok(reply) => error!(reply = %reply, "Model compliance-help reply"),
                        Err(e) => error!(error = %e, "Failed to obtain compliance-help reply"),
                    }
                }
                Err(e) => error!(error = %e, "Failed to obtain page-size violation explanation"),
            }
            return Err(EngineError::ProtocolViolation(format!(
                "list_entries used page size {limit} instead of the mandated {mandated}"
            )));
        }

        let entries = self.memory.list_entries(&memory_id, limit).await?;
        let value = serde_json::to_value(entries).unwrap_or_else(|_| json!([]));
        self.tool_results.insert("list_entries".to_string(), value);
        Ok(())
    }

    async fn exec_search_memories(&mut self, args: SearchArgs) -> Result<(), EngineError> {
        let memory_id = self.resolve_memory_id(args.memory_id.as_deref())?;
        let query = match args.query.filter(|q| !q.is_empty()) {
            Some(q) => q,
            None => {
                return Err(EngineError::MissingField {
                    tool: "search_memories",
                    field: "query",
                });
            }
        };
        let top_k = args.top_k.unwrap_or(5);

        let results = self.memory.search(&memory_id, &query, top_k).await?;
        let value = serde_json::to_value(results).unwrap_or_else(|_| json!({}));
        self.tool_results
            .insert("search_memories".to_string(), value);
        Ok(())
    }

    async fn exec_create_memory(&mut self, args: CreateMemoryArgs) -> Result<(), EngineError> {
        let title = match args.title.filter(|t| !t.is_empty()) {
            Some(t) => t,
            None => {
                return Err(EngineError::MissingField {
                    tool: "create_memory",
                    field: "title",
                });
            }
        };
        let memory_type = args
            .memory_type
            .unwrap_or_else(|| "conversation".to_string());
        let description = args.description.unwrap_or_default();

        let memory_id = self
            .memory
            .create_memory(&title, &memory_type, &description)
            .await?;
        sleep(CREATE_SETTLE).await;

        info!(memory_id = %memory_id, title = %title, "Created memory");
        self.aliases.insert(title, memory_id.clone());
        self.default_memory_id = Some(memory_id.clone());
        self.tool_results
            .insert("create_memory".to_string(), json!(memory_id));
        Ok(())
    }

    async fn exec_get_context(&mut self, args: MemoryRefArgs) -> Result<(), EngineError> {
        let memory_id = self.resolve_memory_id(args.memory_id.as_deref())?;
        info!(memory_id = %memory_id, "Fetching working context");

        let context = self.memory.get_context(&memory_id).await?;
        debug!(chars = context.len(), "Context retrieved");

        self.tool_results
            .insert("get_context".to_string(), json!(context));
        self.bootstrap.record_context_fetch();
        Ok(())
    }

    async fn exec_await_consistency(&mut self, args: MemoryRefArgs) -> Result<(), EngineError> {
        let memory_id = self.resolve_memory_id(args.memory_id.as_deref())?;
        if let Err(e) = self.memory.await_consistency(&memory_id).await {
            warn!(error = %e, "Durability barrier failed, falling back to a settle delay");
            sleep(CONSISTENCY_FALLBACK_SETTLE).await;
        }
        Ok(())
    }

    async fn exec_list_assets(&mut self) -> Result<(), EngineError> {
        let ids = self.memory.list_assets().await?;
        self.tool_results
            .insert("list_assets".to_string(), json!(ids));
        Ok(())
    }

    async fn exec_get_asset(&mut self, args: GetAssetArgs) -> Result<(), EngineError> {
        let asset_id = match args.resolved() {
            Some(id) => id,
            None => {
                return Err(EngineError::MissingField {
                    tool: "get_asset",
                    field: "id",
                });
            }
        };

        if let Some(cached) = self.asset_cache.get(&asset_id) {
            debug!(asset_id = %asset_id, "Returning cached asset");
            self.tool_results
                .insert("get_asset".to_string(), json!(cached));
            return Ok(());
        }

        let text = self.memory.get_asset(&asset_id).await?;
        if text.is_empty() {
            return Err(EngineError::EmptyAsset(asset_id));
        }

        self.asset_cache.insert(asset_id.clone(), text.clone());
        self.tool_results
            .insert("get_asset".to_string(), json!(text));
        self.bootstrap.record_asset(&asset_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_tools() {
        let invocation = ToolInvocation::parse(
            "add_entry",
            &json!({"summary": "s", "raw_entry": "r", "role": "speaker_1"}),
        );
        match invocation {
            ToolInvocation::AddEntry(args) => {
                assert_eq!(args.summary.as_deref(), Some("s"));
                assert_eq!(args.role.as_deref(), Some("speaker_1"));
            }
            other => panic!("Expected AddEntry, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_tool() {
        let invocation = ToolInvocation::parse("delete_everything", &json!({}));
        assert!(matches!(invocation, ToolInvocation::Unknown(name) if name == "delete_everything"));
    }

    #[test]
    fn test_malformed_args_degrade_to_defaults() {
        let invocation = ToolInvocation::parse("list_entries", &json!("not an object"));
        match invocation {
            ToolInvocation::ListEntries(args) => {
                assert!(args.limit.is_none());
                assert!(args.memory_id.is_none());
            }
            other => panic!("Expected ListEntries, got {other:?}"),
        }
    }

    #[test]
    fn test_get_asset_accepts_either_arg_spelling() {
        let by_id = ToolInvocation::parse("get_asset", &json!({"id": "ctx_rules"}));
        let by_asset_id = ToolInvocation::parse("get_asset", &json!({"asset_id": "ctx_rules"}));
        for invocation in [by_id, by_asset_id] {
            match invocation {
                ToolInvocation::GetAsset(args) => {
                    assert_eq!(args.resolved().as_deref(), Some("ctx_rules"));
                }
                other => panic!("Expected GetAsset, got {other:?}"),
            }
        }
    }
}
