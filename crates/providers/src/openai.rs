//! OpenAI chat-completions adapter.

use crate::framing::{framed_response_stream, Framing};
use crate::models::{PricingTable, TierModels};
use crate::traits::{ChatRequest, LlmProvider, LlmResponse};
use crate::util::{ensure_success, from_reqwest, resolve_api_key};
use fa_domain::config::ProviderSettings;
use fa_domain::error::{Error, Result};
use fa_domain::stream::{BoxStream, StreamEvent, Usage};
use fa_domain::tier::Tier;
use fa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const PROVIDER_NAME: &str = "openai";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// USD per million tokens. `gpt-4o-mini` must precede `gpt-4o`.
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.0),
    ("gpt-4-turbo", 10.0, 30.0),
    ("o1-preview", 15.0, 60.0),
    ("o1-mini", 3.0, 12.0),
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    models: TierModels,
    pricing: PricingTable,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let api_key = resolve_api_key(settings.api_key_file.as_deref(), API_KEY_VAR);
        if api_key.is_none() {
            tracing::info!(provider = PROVIDER_NAME, "no API key found, provider unavailable");
        }
        Self::with_api_key(api_key, settings)
    }

    pub fn with_api_key(api_key: Option<String>, settings: &ProviderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
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
            models: TierModels::new("gpt-4o-mini", "gpt-4o", "gpt-4o")
                .with_overrides(settings.tier_overrides()),
            pricing: PricingTable::from_static(PRICING).with_overrides(&settings.pricing),
            client,
        })
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn resolve_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.models.get(Tier::Moderate).to_string())
    }

    async fn post_completions(&self, body: &Value) -> Result<reqwest::Response> {
        let key = self.api_key.as_deref().ok_or_else(|| Error::Unavailable {
            provider: PROVIDER_NAME.into(),
            reason: format!("{API_KEY_VAR} not configured"),
        })?;
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(provider = PROVIDER_NAME, url = %url, "openai request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        ensure_success(PROVIDER_NAME, resp).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn build_chat_body(req: &ChatRequest, model: &str, stream: bool) -> Value {
    let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = &req.system {
        messages.push(serde_json::json!({"role": "system", "content": system}));
    }
    for msg in &req.messages {
        msg_to_openai(msg, &mut messages);
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_openai).collect());
        body["tool_choice"] = Value::String("auto".into());
    }
    if stream {
        body["stream"] = Value::Bool(true);
        body["stream_options"] = serde_json::json!({"include_usage": true});
    }

    body
}

fn msg_to_openai(msg: &Message, out: &mut Vec<Value>) {
    match msg.role {
        Role::Assistant => out.push(assistant_to_openai(msg)),
        // One `tool` message per result, whichever role carried them.
        _ if msg.content.is_tool_results() => {
            if let MessageContent::Parts(parts) = &msg.content {
                for part in parts {
                    if let ContentPart::ToolResult { tool_use_id, content, .. } = part {
                        out.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        }));
                    }
                }
            }
        }
        Role::System => out.push(serde_json::json!({
            "role": "system",
            "content": msg.content.extract_all_text(),
        })),
        Role::User | Role::Tool => out.push(serde_json::json!({
            "role": if msg.role == Role::Tool { "tool" } else { "user" },
            "content": msg.content.extract_all_text(),
        })),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text),
                    ContentPart::ToolUse { id, name, input } => tool_calls.push(serde_json::json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": input.to_string(),
                        }
                    })),
                    ContentPart::ToolResult { .. } => {}
                }
            }
        }
    }

    let mut obj = serde_json::json!({"role": "assistant"});
    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn parse_chat_response(body: Value, model: &str, pricing: &PricingTable) -> Result<LlmResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: PROVIDER_NAME.into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").unwrap_or(&Value::Null);
    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let stop_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let tool_calls = parse_openai_tool_calls(message);
    let usage = body.get("usage").and_then(parse_openai_usage).unwrap_or_default();

    Ok(LlmResponse {
        content,
        model: model.to_string(),
        tokens_in: usage.tokens_in,
        tokens_out: usage.tokens_out,
        cost: pricing.cost(usage.tokens_in, usage.tokens_out, model),
        tool_calls,
        stop_reason,
        raw: Some(body),
    })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(arr) = message.get("tool_calls").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|tc| {
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let args = func.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
            Some(ToolCall { id, arguments: parse_arguments(&name, args), name })
        })
        .collect()
}

/// Function arguments arrive as a JSON string; anything unparseable becomes
/// an empty object.
fn parse_arguments(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(tool = %tool, error = %e, "invalid tool-call arguments, using {{}}");
        Value::Object(Default::default())
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        tokens_in: v.get("prompt_tokens")?.as_u64()? as u32,
        tokens_out: v.get("completion_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool calls are streamed as fragments keyed by `index`.
#[derive(Default)]
pub(crate) struct StreamState {
    /// index -> (id, name, argument fragments)
    pending: BTreeMap<u64, (String, String, String)>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
    done_emitted: bool,
}

impl StreamState {
    fn flush_tool_calls(&mut self, events: &mut Vec<Result<StreamEvent>>) {
        for (_, (id, name, args)) in std::mem::take(&mut self.pending) {
            let arguments = parse_arguments(&name, &args);
            events.push(Ok(StreamEvent::ToolCall { id, name, arguments }));
        }
    }

    fn finish(&mut self, events: &mut Vec<Result<StreamEvent>>) {
        self.flush_tool_calls(events);
        if !self.done_emitted {
            self.done_emitted = true;
            events.push(Ok(StreamEvent::Done {
                usage: self.usage,
                stop_reason: self.stop_reason.clone(),
            }));
        }
    }
}

pub(crate) fn parse_openai_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    if data.trim() == "[DONE]" {
        state.finish(&mut events);
        return events;
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string();
        events.push(Ok(StreamEvent::Error { message }));
        return events;
    }

    if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
        state.usage = Some(usage);
    }

    let Some(choice) = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        // Usage-only chunk (include_usage) arrives after finish_reason.
        if state.stop_reason.is_some() {
            state.finish(&mut events);
        }
        return events;
    };

    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Text { text: text.to_string() }));
        }
    }

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            let func = tc.get("function");
            let entry = state.pending.entry(idx).or_default();
            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                entry.0 = id.to_string();
                entry.1 = func
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                events.push(Ok(StreamEvent::ToolStart {
                    id: entry.0.clone(),
                    name: entry.1.clone(),
                }));
            }
            if let Some(args) = func.and_then(|f| f.get("arguments")).and_then(|v| v.as_str()) {
                entry.2.push_str(args);
            }
        }
    }

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        state.stop_reason = Some(fr.to_string());
        state.flush_tool_calls(&mut events);
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
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
        let body = build_chat_body(&req, &model, false);
        let resp = self.post_completions(&body).await?;
        let json: Value = resp.json().await.map_err(from_reqwest)?;
        parse_chat_response(json, &model, &self.pricing)
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = self.resolve_model(&req);
        let body = build_chat_body(&req, &model, true);
        let resp = self.post_completions(&body).await?;

        let mut state = StreamState::default();
        Ok(framed_response_stream(resp, Framing::Sse, move |data| {
            parse_openai_sse(data, &mut state)
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
