//! Turn engine and session closer.
//!
//! One `SessionRunner` drives one conversational session: it owns the
//! history, paces every provider call through the shared `RequestPacer`,
//! absorbs transient provider failures on the dual-class backoff
//! schedule, multiplexes tool invocations to the memory service, and
//! runs the bounded termination protocol.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::Config;
use crate::domain::ports::{
    ChatMessage, ContentBlock, MemoryService, MessageContent, ModelProvider, StopSignal, ToolSpec,
    TurnRequest,
};
use crate::services::backoff::{BackoffClass, BackoffSchedule};
use crate::services::bootstrap::BootstrapTracker;
use crate::services::dispatch::ToolInvocation;
use crate::services::error::EngineError;
use crate::services::pacer::RequestPacer;

/// Sentinel announcing the termination protocol to the model.
pub const END_SESSION_TOKEN: &str = "control:test_harness SESSION_END";

/// Messages with this prefix are harness control traffic, logged at
/// DEBUG instead of INFO to keep transcripts readable.
pub const CONTROL_PREFIX: &str = "control:";

/// Synthetic no-op turn used while polling for bootstrap completion.
const BOOTSTRAP_POLL_TOKEN: &str = "control:test_harness BOOTSTRAP_POLL";

/// Per-session settings, derived from [`Config`] plus run-specific
/// inputs (system prompt, tool schema, pre-provisioned memory id).
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub system_prompt: Option<String>,
    pub tool_schema: Vec<ToolSpec>,
    pub default_memory_id: Option<String>,
    pub entry_page_size: u32,
    pub required_assets: Vec<String>,
    pub close_max_turns: u32,
    pub bootstrap_max_polls: u32,
    pub summary_max_chars: usize,
    pub default_budget: u32,
    pub continuation_increment: u32,
    pub backoff: BackoffSchedule,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.provider.model.clone(),
            system_prompt: None,
            tool_schema: Vec::new(),
            default_memory_id: None,
            entry_page_size: config.session.entry_page_size,
            required_assets: config.session.required_assets.clone(),
            close_max_turns: config.session.close_max_turns,
            bootstrap_max_polls: config.session.bootstrap_max_polls,
            summary_max_chars: config.session.summary_max_chars,
            default_budget: config.session.default_budget,
            continuation_increment: config.session.continuation_increment,
            backoff: BackoffSchedule::from_config(&config.backoff),
        }
    }
}

/// Drives one session against the provider and the memory service.
///
/// Not safe for concurrent calls: one `step`/`close_session` in flight
/// at a time, enforced by `&mut self`.
pub struct SessionRunner {
    pub(crate) provider: Arc<dyn ModelProvider>,
    pub(crate) memory: Arc<dyn MemoryService>,
    pub(crate) pacer: Arc<RequestPacer>,
    pub(crate) opts: SessionOptions,

    pub(crate) history: Vec<ChatMessage>,
    /// Logical turn counter, incremented once per `step`.
    pub(crate) turn_counter: u64,
    /// Turn counter value at the most recent snapshot write; 0 = never.
    pub(crate) last_snapshot_turn: u64,

    /// Per-turn tool results, keyed by tool name; cleared every
    /// dispatch round.
    pub(crate) tool_results: HashMap<String, Value>,
    /// Title -> memory id aliases from mid-session create_memory calls.
    pub(crate) aliases: HashMap<String, String>,
    /// Session-scoped asset bodies, so repeat fetches skip the backend.
    pub(crate) asset_cache: HashMap<String, String>,
    pub(crate) default_memory_id: Option<String>,

    pub(crate) bootstrap: BootstrapTracker,
    pub(crate) persist_violation_asked: bool,
    pub(crate) asset_violation_asked: bool,
    pub(crate) empty_context_asked: bool,
}

impl SessionRunner {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        memory: Arc<dyn MemoryService>,
        pacer: Arc<RequestPacer>,
        opts: SessionOptions,
    ) -> Self {
        let bootstrap = BootstrapTracker::new(opts.required_assets.clone());
        let default_memory_id = opts.default_memory_id.clone();
        Self {
            provider,
            memory,
            pacer,
            opts,
            history: Vec::new(),
            turn_counter: 0,
            last_snapshot_turn: 0,
            tool_results: HashMap::new(),
            aliases: HashMap::new(),
            asset_cache: HashMap::new(),
            default_memory_id,
            bootstrap,
            persist_violation_asked: false,
            asset_violation_asked: false,
            empty_context_asked: false,
        }
    }

    pub fn is_bootstrap_complete(&self) -> bool {
        self.bootstrap.is_complete()
    }

    pub fn tool_schema(&self) -> &[ToolSpec] {
        &self.opts.tool_schema
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send one user message with the default budget.
    pub async fn step(&mut self, user_text: &str) -> Result<String, EngineError> {
        self.step_with_budget(user_text, self.opts.default_budget)
            .await
    }

    /// Send one user message, return the model's visible reply text.
    #[instrument(skip(self, user_text), fields(turn = self.turn_counter + 1))]
    pub async fn step_with_budget(
        &mut self,
        user_text: &str,
        budget: u32,
    ) -> Result<String, EngineError> {
        let is_control = user_text
            .trim_start()
            .to_lowercase()
            .starts_with(CONTROL_PREFIX);
        if is_control {
            debug!("[CTRL] {user_text}");
        } else {
            info!("[MSG][user] {user_text}");
        }
        self.history.push(ChatMessage::user(user_text));
        self.turn_counter += 1;

        let mut request = TurnRequest {
            model: self.opts.model.clone(),
            messages: self.history.clone(),
            system: self.opts.system_prompt.clone(),
            tools: self.opts.tool_schema.clone(),
            max_tokens: budget,
        };

        let mut response = self.call_with_backoff(&request).await?;
        let mut blocks = std::mem::take(&mut response.content);
        let mut stop = response.stop;

        // A parked turn re-issues the identical request with a slightly
        // larger budget and accumulates the extra blocks.
        while stop == StopSignal::NeedsContinuation {
            request.max_tokens += self.opts.continuation_increment;
            info!(
                max_tokens = request.max_tokens,
                "Continuation signaled, re-issuing identical request"
            );
            let next = self.call_with_backoff(&request).await?;
            blocks.extend(next.content);
            stop = next.stop;
        }

        if stop == StopSignal::MaxTokens {
            warn!(
                max_tokens = request.max_tokens,
                "Model hit the response budget; reply may be truncated"
            );
        }
        debug!(blocks = blocks.len(), "Provider turn complete");

        let mut reply = String::new();
        let mut invocations: Vec<(Option<String>, String, Value)> = Vec::new();
        for block in &blocks {
            match block {
                ContentBlock::Text { text } => {
                    let trimmed = text.trim();
                    if reply.is_empty() && !trimmed.is_empty() {
                        reply = trimmed.to_string();
                        info!("[MSG][assistant] {reply}");
                    }
                }
                ContentBlock::ToolUse { id, name, input } => {
                    invocations.push((id.clone(), name.clone(), input.clone()));
                }
                ContentBlock::ToolResult { .. } => {}
            }
        }

        // An empty assistant turn must never enter history; the next
        // provider call would reject it.
        if !reply.is_empty() {
            self.history.push(ChatMessage::assistant(reply.clone()));
        }

        if !invocations.is_empty() {
            self.tool_results.clear();

            for (_, name, input) in &invocations {
                info!(tool = %name, "Tool call emitted");
                let invocation = ToolInvocation::parse(name, input);
                self.dispatch(invocation).await?;
            }

            // Only after every dispatch succeeded: echo each tool_use
            // and its result so the model sees the calls completed.
            for (id, name, input) in invocations {
                self.history
                    .push(ChatMessage::assistant_blocks(vec![ContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input,
                    }]));
                let payload = self.result_payload(&name);
                self.history
                    .push(ChatMessage::user_blocks(vec![ContentBlock::ToolResult {
                        tool_use_id: id,
                        content: payload.to_string(),
                    }]));
            }
        }

        Ok(reply)
    }

    /// One observational side-channel turn.
    ///
    /// Advisories ask the model to explain a protocol deviation. They
    /// append the probe and any reply to history but never dispatch
    /// tool calls and never advance the turn counter, so the primary
    /// state machine is unaffected.
    pub async fn advisory(&mut self, probe: &str) -> Result<String, EngineError> {
        debug!("[ADVISORY] {probe}");
        self.history.push(ChatMessage::user(probe));

        let request = TurnRequest {
            model: self.opts.model.clone(),
            messages: self.history.clone(),
            system: self.opts.system_prompt.clone(),
            tools: self.opts.tool_schema.clone(),
            max_tokens: self.opts.default_budget,
        };
        let response = self.call_with_backoff(&request).await?;

        let mut reply = String::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text } => {
                    let trimmed = text.trim();
                    if reply.is_empty() && !trimmed.is_empty() {
                        reply = trimmed.to_string();
                    }
                }
                ContentBlock::ToolUse { name, .. } => {
                    debug!(tool = %name, "Ignoring tool call inside advisory reply");
                }
                ContentBlock::ToolResult { .. } => {}
            }
        }

        if !reply.is_empty() {
            self.history.push(ChatMessage::assistant(reply.clone()));
        }
        Ok(reply)
    }

    /// Poll with synthetic control turns until bootstrap completes.
    pub async fn await_bootstrap(&mut self) -> Result<(), EngineError> {
        for poll in 1..=self.opts.bootstrap_max_polls {
            if self.bootstrap.is_complete() {
                return Ok(());
            }
            debug!(poll, "Bootstrap incomplete, sending polling turn");
            self.step(BOOTSTRAP_POLL_TOKEN).await?;
        }
        if self.bootstrap.is_complete() {
            Ok(())
        } else {
            error!(
                polls = self.opts.bootstrap_max_polls,
                "Bootstrap never completed"
            );
            Err(EngineError::BootstrapTimeout {
                polls: self.opts.bootstrap_max_polls,
            })
        }
    }

    /// Bounded termination protocol.
    ///
    /// Nudges the model until exactly one snapshot write lands on the
    /// current turn, or raises after the attempt budget with the
    /// model's own explanation when one could be obtained.
    pub async fn close_session(&mut self) -> Result<String, EngineError> {
        let max_turns = self.opts.close_max_turns;

        let full_instruction = format!(
            "{END_SESSION_TOKEN}\n\n\
             You are closing the session. Perform these steps in order:\n\
             1. Persist any remaining dialogue via add_entry (follow entry_capture rules).\n\
             2. Call await_consistency().\n\
             3. Issue exactly **one** put_context() call whose `content`:\n\
             - Is wrapped in triple back-ticks (``` ```).\n\
             - Adheres to the section ordering defined in @context_prompt.md (asset `ctx_prompt_chat`).\n\
             - Is <= 5000 characters.\n\
             After put_context succeeds, reply with `control:note_taker_assistant OK`."
        );
        let reminder = format!(
            "{END_SESSION_TOKEN}\n\n\
             REMINDER: If you don't have any more entries to save, \
             call put_context() now to close the session."
        );

        let mut prompt = full_instruction;
        for attempt in 1..=max_turns {
            info!(attempt, max_turns, "Close-session turn");
            let reply = self.step(&prompt).await?;

            if self.last_snapshot_turn == self.turn_counter {
                info!("Snapshot write captured, session closed cleanly");
                return Ok(reply);
            }

            // Longer reminder every third attempt to avoid getting stuck.
            prompt = if attempt % 3 == 0 {
                reminder.clone()
            } else {
                END_SESSION_TOKEN.to_string()
            };
        }

        warn!(
            attempts = max_turns,
            "No snapshot write observed, requesting explanation"
        );
        let mut explanation = None;
        match self
            .advisory("You have not issued the required `put_context` call. Please explain why.")
            .await
        {
            Ok(text) if !text.is_empty() => {
                error!(explanation = %text, "Model explanation for missing snapshot write");
                explanation = Some(text);
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to obtain final explanation"),
        }

        Err(EngineError::Termination {
            attempts: max_turns,
            explanation,
        })
    }

    /// Paced provider call with dual-class backoff.
    ///
    /// The absolute retry deadline is fixed when this method is
    /// entered. Overload and throttle failures sleep and retry on
    /// their own schedules; anything else propagates immediately.
    pub(crate) async fn call_with_backoff(
        &self,
        request: &TurnRequest,
    ) -> Result<crate::domain::ports::TurnResponse, EngineError> {
        let mut backoff = self.opts.backoff.start();
        let mut attempt: u32 = 1;
        loop {
            self.pacer.pace().await;
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let class = if err.is_overloaded() {
                        BackoffClass::Overload
                    } else if err.is_throttled() {
                        BackoffClass::Throttle
                    } else {
                        return Err(err.into());
                    };

                    match backoff.next_delay(class) {
                        Some(delay) => {
                            warn!(
                                attempt,
                                retry_in_secs = delay.as_secs(),
                                error = %err,
                                "Transient provider error, backing off"
                            );
                            sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            error!(
                                attempt,
                                error = %err,
                                "Retry deadline exceeded, giving up"
                            );
                            return Err(err.into());
                        }
                    }
                }
            }
        }
    }

    /// Canonical memory id for a tool call.
    ///
    /// Resolution order: literal UUID candidate, title alias, session
    /// default, then the raw candidate as a last-ditch value.
    pub(crate) fn resolve_memory_id(
        &self,
        candidate: Option<&str>,
    ) -> Result<String, EngineError> {
        if let Some(c) = candidate {
            if Uuid::parse_str(c).is_ok() {
                return Ok(c.to_string());
            }
            if let Some(id) = self.aliases.get(c) {
                return Ok(id.clone());
            }
        }
        if let Some(id) = &self.default_memory_id {
            return Ok(id.clone());
        }
        if let Some(c) = candidate {
            if !c.is_empty() {
                return Ok(c.to_string());
            }
        }
        Err(EngineError::UnresolvedMemoryId(
            candidate.unwrap_or_default().to_string(),
        ))
    }

    /// Speaker role inferred from the `benchmark_conversation:<role>`
    /// prefix of the most recent matching user message.
    pub(crate) fn infer_role_from_history(&self) -> Option<String> {
        for msg in self.history.iter().rev() {
            if msg.role != "user" {
                continue;
            }
            if let MessageContent::Text(text) = &msg.content {
                let token = text.split_whitespace().next().unwrap_or_default();
                if let Some(role) = token.strip_prefix("benchmark_conversation:") {
                    if !role.is_empty() {
                        return Some(role.to_string());
                    }
                }
            }
        }
        None
    }

    /// Normalized `{status, ...}` object echoed back to the model.
    pub(crate) fn result_payload(&self, tool_name: &str) -> Value {
        let status = if matches!(tool_name, "add_entry" | "put_context") {
            "enqueued"
        } else {
            "OK"
        };
        let mut payload = json!({ "status": status });

        match tool_name {
            "create_memory" => {
                payload["memory_id"] = self
                    .tool_results
                    .get("create_memory")
                    .cloned()
                    .unwrap_or_else(|| json!(""));
            }
            "get_context" => {
                payload["context"] = self
                    .tool_results
                    .get("get_context")
                    .cloned()
                    .unwrap_or_else(|| json!(""));
            }
            "list_entries" => {
                payload["entries"] = self
                    .tool_results
                    .get("list_entries")
                    .cloned()
                    .unwrap_or_else(|| json!([]));
            }
            "search_memories" => {
                if let Some(Value::Object(map)) = self.tool_results.get("search_memories") {
                    for (key, value) in map {
                        payload[key] = value.clone();
                    }
                }
            }
            "get_asset" => {
                payload["asset"] = self
                    .tool_results
                    .get("get_asset")
                    .cloned()
                    .unwrap_or_else(|| json!(""));
            }
            "list_assets" => {
                payload["assets"] = self
                    .tool_results
                    .get("list_assets")
                    .cloned()
                    .unwrap_or_else(|| json!([]));
            }
            _ => {}
        }
        payload
    }
}
