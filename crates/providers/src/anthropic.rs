//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API including tool use, streaming, and
//! the Anthropic-specific message structure where the system prompt goes in
//! a separate top-level `system` field and tool results travel as user
//! messages.

use crate::framing::{framed_response_stream, Framing};
use crate::models::{PricingTable, TierModels};
use crate::traits::{ChatRequest, LlmProvider, LlmResponse};
use crate::util::{ensure_success, from_reqwest, resolve_api_key};
use fa_domain::config::ProviderSettings;
use fa_domain::error::{Error, Result};
use fa_domain::stream::{BoxStream, StreamEvent, Usage};
use fa_domain::tier::Tier;
use fa_domain::tool::{
    render_tool_output, ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const PROVIDER_NAME: &str = "anthropic";
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// USD per million tokens. Full names first, then family aliases for the
/// substring pass.
const PRICING: &[(&str, f64, f64)] = &[
    ("claude-haiku-4-5-20250514", 1.0, 5.0),
    ("claude-sonnet-4-20250514", 3.0, 15.0),
    ("claude-opus-4-20250514", 15.0, 75.0),
    ("haiku", 1.0, 5.0),
    ("sonnet", 3.0, 15.0),
    ("opus", 15.0, 75.0),
];

fn default_models() -> TierModels {
    TierModels::new(
        "claude-haiku-4-5-20250514",
        "claude-sonnet-4-20250514",
        "claude-sonnet-4-20250514",
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    base_url: String,
    api_key: Option<String>,
    models: TierModels,
    pricing: PricingTable,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider from its config section. A missing API key is not
    /// an error: the provider is built but reports itself unavailable.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let api_key = resolve_api_key(settings.api_key_file.as_deref(), API_KEY_VAR);
        if api_key.is_none() {
            tracing::info!(provider = PROVIDER_NAME, "no API key found, provider unavailable");
        }
        Self::with_api_key(api_key, settings)
    }

    pub fn with_api_key(api_key: Option<String>, settings: &ProviderSettings) -> Result<Self> {
        let timeout = settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: settings
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            models: default_models().with_overrides(settings.tier_overrides()),
            pricing: PricingTable::from_static(PRICING).with_overrides(&settings.pricing),
            client,
        })
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| Error::Unavailable {
            provider: PROVIDER_NAME.into(),
            reason: format!("{API_KEY_VAR} not configured"),
        })
    }

    fn resolve_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.models.get(Tier::Moderate).to_string())
    }

    async fn post_messages(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);
        tracing::debug!(provider = PROVIDER_NAME, url = %url, "anthropic request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        ensure_success(PROVIDER_NAME, resp).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request body
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn build_messages_body(req: &ChatRequest, model: &str, stream: bool) -> Value {
    let mut system_parts: Vec<String> = req.system.iter().cloned().collect();
    let mut api_messages: Vec<Value> = Vec::new();

    for msg in &req.messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.extract_all_text()),
            Role::Assistant => api_messages.push(assistant_msg_to_anthropic(msg)),
            Role::User | Role::Tool if msg.content.is_tool_results() => {
                let blocks = tool_result_blocks(msg);
                // Consecutive tool results belong to the same user turn.
                match api_messages.last_mut() {
                    Some(prev) if is_tool_result_turn(prev) => {
                        if let Some(arr) = prev["content"].as_array_mut() {
                            arr.extend(blocks);
                        }
                    }
                    _ => api_messages.push(serde_json::json!({
                        "role": "user",
                        "content": blocks,
                    })),
                }
            }
            Role::User | Role::Tool => api_messages.push(user_msg_to_anthropic(msg)),
        }
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": api_messages,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    if stream {
        body["stream"] = Value::Bool(true);
    }
    if !system_parts.is_empty() {
        body["system"] = Value::String(system_parts.join("\n\n"));
    }
    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_anthropic).collect());
    }

    body
}

fn is_tool_result_turn(v: &Value) -> bool {
    v["role"] == "user"
        && v["content"].as_array().is_some_and(|arr| {
            !arr.is_empty() && arr.iter().all(|b| b["type"] == "tool_result")
        })
}

fn user_msg_to_anthropic(msg: &Message) -> Value {
    serde_json::json!({
        "role": "user",
        "content": msg.content.extract_all_text(),
    })
}

fn assistant_msg_to_anthropic(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Text(t) => vec![serde_json::json!({"type": "text", "text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(serde_json::json!({
                    "type": "text",
                    "text": text,
                })),
                ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input,
                })),
                ContentPart::ToolResult { .. } => None,
            })
            .collect(),
    };
    serde_json::json!({
        "role": "assistant",
        "content": content,
    })
}

fn tool_result_blocks(msg: &Message) -> Vec<Value> {
    match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult { tool_use_id, content, is_error } => {
                    let mut block = serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": content,
                    });
                    if *is_error {
                        block["is_error"] = Value::Bool(true);
                    }
                    Some(block)
                }
                _ => None,
            })
            .collect(),
        MessageContent::Text(_) => Vec::new(),
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn parse_anthropic_response(body: Value, model: &str, pricing: &PricingTable) -> LlmResponse {
    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    if let Some(blocks) = body.get("content").and_then(|v| v.as_array()) {
        for block in blocks {
            match block.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                "text" => {
                    if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                        content.push_str(t);
                    }
                }
                "tool_use" => tool_calls.push(ToolCall {
                    id: str_field(block, "id"),
                    name: str_field(block, "name"),
                    arguments: block
                        .get("input")
                        .cloned()
                        .unwrap_or(Value::Object(Default::default())),
                }),
                _ => {}
            }
        }
    }

    let usage = body.get("usage").and_then(parse_anthropic_usage).unwrap_or_default();
    let stop_reason = str_field(&body, "stop_reason");

    LlmResponse {
        content,
        model: model.to_string(),
        tokens_in: usage.tokens_in,
        tokens_out: usage.tokens_out,
        cost: pricing.cost(usage.tokens_in, usage.tokens_out, model),
        tool_calls,
        stop_reason,
        raw: Some(body),
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        tokens_in: v.get("input_tokens")?.as_u64()? as u32,
        tokens_out: v.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State for assembling tool calls from streamed content blocks.
#[derive(Default)]
pub(crate) struct StreamState {
    /// Block index -> (call_id, name, partial JSON arguments).
    active_tool_calls: HashMap<u64, (String, String, String)>,
    usage: Option<Usage>,
    done_emitted: bool,
}

/// Parse one Anthropic SSE `data:` payload into zero or more events.
pub(crate) fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    match v.get("type").and_then(|v| v.as_str()).unwrap_or("") {
        "message_start" => {
            state.usage = v
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(parse_anthropic_usage);
        }

        "content_block_start" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(block) = v.get("content_block") {
                if block.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
                    let id = str_field(block, "id");
                    let name = str_field(block, "name");
                    events.push(Ok(StreamEvent::ToolStart {
                        id: id.clone(),
                        name: name.clone(),
                    }));
                    state.active_tool_calls.insert(idx, (id, name, String::new()));
                }
            }
        }

        "content_block_delta" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            let delta = v.get("delta").unwrap_or(&Value::Null);
            match delta.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                "text_delta" => {
                    if let Some(text) = delta.get("text").and_then(|v| v.as_str()) {
                        if !text.is_empty() {
                            events.push(Ok(StreamEvent::Text { text: text.to_string() }));
                        }
                    }
                }
                "input_json_delta" => {
                    if let Some(partial) = delta.get("partial_json").and_then(|v| v.as_str()) {
                        if let Some(tc) = state.active_tool_calls.get_mut(&idx) {
                            tc.2.push_str(partial);
                        }
                    }
                }
                _ => {}
            }
        }

        "content_block_stop" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some((id, name, args)) = state.active_tool_calls.remove(&idx) {
                let arguments = if args.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&args).unwrap_or_else(|e| {
                        tracing::warn!(tool = %name, error = %e, "unparseable streamed tool arguments");
                        Value::Object(Default::default())
                    })
                };
                events.push(Ok(StreamEvent::ToolCall { id, name, arguments }));
            }
        }

        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
            {
                state.usage.get_or_insert_with(Usage::default).tokens_out = output as u32;
            }
            let stop_reason = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(String::from);
            if stop_reason.is_some() && !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    stop_reason,
                }));
            }
        }

        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    stop_reason: Some("end_turn".into()),
                }));
            }
        }

        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            events.push(Ok(StreamEvent::Error { message: msg.to_string() }));
        }

        // ping and future event types
        _ => {}
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn model_for_tier(&self, tier: Tier) -> String {
        self.models.get(tier).to_string()
    }

    fn calculate_cost(&self, tokens_in: u32, tokens_out: u32, model: &str) -> f64 {
        self.pricing.cost(tokens_in, tokens_out, model)
    }

    async fn chat(&self, req: ChatRequest) -> Result<LlmResponse> {
        let model = self.resolve_model(&req);
        let body = build_messages_body(&req, &model, false);
        let resp = self.post_messages(&body).await?;
        let json: Value = resp.json().await.map_err(from_reqwest)?;
        Ok(parse_anthropic_response(json, &model, &self.pricing))
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = self.resolve_model(&req);
        let body = build_messages_body(&req, &model, true);
        let resp = self.post_messages(&body).await?;

        let mut state = StreamState::default();
        Ok(framed_response_stream(resp, Framing::Sse, move |data| {
            parse_anthropic_sse(data, &mut state)
        }))
    }

    /// Anthropic expects tool results inside a user turn.
    fn format_tool_result(&self, tool_call_id: &str, result: &Value) -> Message {
        Message {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_call_id.to_string(),
                content: render_tool_output(result),
                is_error: result.get("error").is_some(),
            }]),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
