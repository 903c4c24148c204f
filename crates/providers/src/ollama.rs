//! Local Ollama daemon adapter.
//!
//! Free, local, and only sometimes tool-capable: tools are sent only when
//! the selected model belongs to a family known to support them.

use crate::availability::AvailabilityCache;
use crate::framing::{framed_response_stream, Framing};
use crate::models::TierModels;
use crate::traits::{ChatRequest, LlmProvider, LlmResponse};
use crate::util::{ensure_success, from_reqwest};
use fa_domain::config::ProviderSettings;
use fa_domain::error::{Error, Result};
use fa_domain::stream::{BoxStream, StreamEvent, Usage};
use fa_domain::tier::Tier;
use fa_domain::tool::{
    render_tool_output, ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition,
};
use serde_json::Value;
use std::time::Duration;

pub const PROVIDER_NAME: &str = "ollama";

const DEFAULT_HOST: &str = "http://localhost:11434";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const LIST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 300;

/// Model families that accept tool definitions.
pub const TOOL_CAPABLE_FAMILIES: &[&str] = &[
    "qwen2.5", "qwen2", "qwen3", "llama3.1", "llama3.2", "llama3.3", "mistral", "mixtral",
    "command-r",
];

/// Whether `model` (e.g. `qwen2.5:14b`) belongs to a tool-capable family.
pub fn model_supports_tools(model: &str) -> bool {
    let family = model.split(':').next().unwrap_or(model).to_lowercase();
    TOOL_CAPABLE_FAMILIES.iter().any(|f| family.contains(f))
}

pub struct OllamaProvider {
    host: String,
    models: TierModels,
    availability: AvailabilityCache,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn from_settings(settings: &ProviderSettings, availability_ttl: Duration) -> Result<Self> {
        let timeout = settings.timeout_secs.unwrap_or(DEFAULT_CHAT_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            host: settings
                .host
                .as_deref()
                .unwrap_or(DEFAULT_HOST)
                .trim_end_matches('/')
                .to_string(),
            models: TierModels::new("llama3.2:3b", "qwen2.5:14b", "qwen2.5:14b")
                .with_overrides(settings.tier_overrides()),
            availability: AvailabilityCache::new(availability_ttl),
            client,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Models pulled into the local daemon.
    pub async fn list_local_models(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(from_reqwest)?;
        let resp = ensure_success(PROVIDER_NAME, resp).await?;
        let body: Value = resp.json().await.map_err(from_reqwest)?;
        Ok(body
            .get("models")
            .and_then(|m| m.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()).map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = PROVIDER_NAME, url = %url, error = %e, "probe failed");
                false
            }
        }
    }

    async fn post_chat(&self, req: &ChatRequest, stream: bool) -> Result<(String, reqwest::Response)> {
        if !self.is_available().await {
            return Err(Error::Unavailable {
                provider: PROVIDER_NAME.into(),
                reason: format!("daemon not reachable at {} (start it with `ollama serve`)", self.host),
            });
        }
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.models.get(Tier::Moderate).to_string());
        let body = build_chat_body(req, &model, stream);
        let url = format!("{}/api/chat", self.host);
        tracing::debug!(provider = PROVIDER_NAME, url = %url, model = %model, "ollama request");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;
        Ok((model, ensure_success(PROVIDER_NAME, resp).await?))
    }
}

// ── Request body ───────────────────────────────────────────────────

pub(crate) fn build_chat_body(req: &ChatRequest, model: &str, stream: bool) -> Value {
    let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = &req.system {
        messages.push(serde_json::json!({"role": "system", "content": system}));
    }
    for msg in &req.messages {
        messages.extend(msg_to_ollama(msg));
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": stream,
    });

    if !req.tools.is_empty() {
        if model_supports_tools(model) {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_ollama).collect());
        } else {
            tracing::debug!(model = %model, "model is not tool-capable, omitting tools");
        }
    }

    body
}

fn msg_to_ollama(msg: &Message) -> Vec<Value> {
    if msg.content.is_tool_results() {
        if let MessageContent::Parts(parts) = &msg.content {
            return parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolResult { content, .. } => {
                        Some(serde_json::json!({"role": "tool", "content": content}))
                    }
                    _ => None,
                })
                .collect();
        }
    }

    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut obj = serde_json::json!({
        "role": role,
        "content": msg.content.extract_all_text(),
    });
    let calls = msg.tool_calls();
    if msg.role == Role::Assistant && !calls.is_empty() {
        obj["tool_calls"] = Value::Array(
            calls
                .iter()
                .map(|c| serde_json::json!({"function": {"name": c.name, "arguments": c.arguments}}))
                .collect(),
        );
    }
    vec![obj]
}

fn tool_to_ollama(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

// ── Response parsing ───────────────────────────────────────────────

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(arr) = message.get("tool_calls").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .enumerate()
        .filter_map(|(i, tc)| {
            let func = tc.get("function")?;
            Some(ToolCall {
                id: tc
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| format!("call_{i}")),
                name: func.get("name")?.as_str()?.to_string(),
                arguments: func
                    .get("arguments")
                    .cloned()
                    .filter(|a| a.is_object())
                    .unwrap_or(Value::Object(Default::default())),
            })
        })
        .collect()
}

fn parse_usage(data: &Value) -> Usage {
    Usage {
        tokens_in: data.get("prompt_eval_count").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        tokens_out: data.get("eval_count").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
    }
}

pub(crate) fn parse_chat_response(data: Value, model: &str) -> LlmResponse {
    let message = data.get("message").unwrap_or(&Value::Null);
    let usage = parse_usage(&data);
    LlmResponse {
        content: message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        model: model.to_string(),
        tokens_in: usage.tokens_in,
        tokens_out: usage.tokens_out,
        cost: 0.0,
        tool_calls: parse_tool_calls(message),
        stop_reason: data
            .get("done_reason")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        raw: Some(data),
    }
}

/// Parse one NDJSON line. Unparseable lines are skipped.
pub(crate) fn parse_stream_line(line: &str) -> Vec<Result<StreamEvent>> {
    let data: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable ollama stream line");
            return Vec::new();
        }
    };

    if let Some(err) = data.get("error").and_then(|e| e.as_str()) {
        return vec![Ok(StreamEvent::Error { message: err.to_string() })];
    }

    let mut events = Vec::new();
    let message = data.get("message").unwrap_or(&Value::Null);

    if let Some(text) = message.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Text { text: text.to_string() }));
        }
    }
    for call in parse_tool_calls(message) {
        events.push(Ok(StreamEvent::ToolCall {
            id: call.id,
            name: call.name,
            arguments: call.arguments,
        }));
    }
    if data.get("done").and_then(|v| v.as_bool()) == Some(true) {
        events.push(Ok(StreamEvent::Done {
            usage: Some(parse_usage(&data)),
            stop_reason: data.get("done_reason").and_then(|v| v.as_str()).map(String::from),
        }));
    }

    events
}

// ── Trait implementation ───────────────────────────────────────────

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        self.availability.get_or_probe(|| self.probe()).await
    }

    /// True when any configured tier model is tool-capable.
    fn supports_tools(&self) -> bool {
        self.models.iter().any(|(_, m)| model_supports_tools(m))
    }

    fn model_for_tier(&self, tier: Tier) -> String {
        self.models.get(tier).to_string()
    }

    async fn chat(&self, req: ChatRequest) -> Result<LlmResponse> {
        let (model, resp) = self.post_chat(&req, false).await?;
        let data: Value = resp.json().await.map_err(from_reqwest)?;
        Ok(parse_chat_response(data, &model))
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let (_, resp) = self.post_chat(&req, true).await?;
        Ok(framed_response_stream(resp, Framing::Ndjson, parse_stream_line))
    }

    /// Ollama tool messages carry no call id.
    fn format_tool_result(&self, _tool_call_id: &str, result: &Value) -> Message {
        Message {
            role: Role::Tool,
            content: MessageContent::Text(render_tool_output(result)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(settings: ProviderSettings) -> OllamaProvider {
        OllamaProvider::from_settings(&settings, Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn tool_capability_by_family() {
        assert!(model_supports_tools("qwen2.5:14b"));
        assert!(model_supports_tools("Llama3.1:8b"));
        assert!(model_supports_tools("command-r"));
        assert!(!model_supports_tools("phi3:mini"));
        assert!(!model_supports_tools("gemma2:9b"));
        // Only the family part counts.
        assert!(!model_supports_tools("phi3:mistral-tuned"));
    }

    #[test]
    fn supports_tools_when_any_tier_model_is_capable() {
        assert!(provider(ProviderSettings::default()).supports_tools());

        let mut settings = ProviderSettings::default();
        for tier in ["simple", "moderate", "complex"] {
            settings.models.insert(tier.into(), "phi3:mini".into());
        }
        assert!(!provider(settings).supports_tools());
    }

    #[test]
    fn ollama_is_free() {
        let p = provider(ProviderSettings::default());
        assert_eq!(p.calculate_cost(1_000_000, 1_000_000, "qwen2.5:14b"), 0.0);
    }

    #[test]
    fn tools_omitted_for_incapable_model() {
        let req = ChatRequest::new(vec![Message::user("show my budgets")]).with_tools(vec![
            ToolDefinition {
                name: "list_budgets".into(),
                description: String::new(),
                input_schema: json!({"type": "object"}),
            },
        ]);
        let body = build_chat_body(&req, "phi3:mini", false);
        assert!(body.get("tools").is_none());
        let body = build_chat_body(&req, "qwen2.5:14b", true);
        assert_eq!(body["tools"][0]["function"]["name"], "list_budgets");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn tool_result_has_no_call_id() {
        let p = provider(ProviderSettings::default());
        let msg = p.format_tool_result("ignored", &json!({"total": 3}));
        let req = ChatRequest::new(vec![msg]).with_system("sys");
        let body = build_chat_body(&req, "qwen2.5:14b", false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1], json!({"role": "tool", "content": r#"{"total":3}"#}));
    }

    #[test]
    fn response_fills_missing_ids_and_counts() {
        let data = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "get_balances", "arguments": {}}},
                    {"function": {"name": "get_goals", "arguments": {"active": true}}}
                ]
            },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 120,
            "eval_count": 30
        });
        let r = parse_chat_response(data, "qwen2.5:14b");
        assert_eq!(r.tool_calls[0].id, "call_0");
        assert_eq!(r.tool_calls[1].id, "call_1");
        assert_eq!(r.tool_calls[1].arguments["active"], true);
        assert_eq!((r.tokens_in, r.tokens_out), (120, 30));
        assert_eq!(r.stop_reason, "stop");
        assert_eq!(r.cost, 0.0);
    }

    #[test]
    fn stream_lines() {
        assert_eq!(
            parse_stream_line(r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#)
                .into_iter()
                .map(|e| e.unwrap())
                .collect::<Vec<_>>(),
            vec![StreamEvent::Text { text: "Hel".into() }]
        );
        assert!(parse_stream_line("not json").is_empty());

        let last: Vec<StreamEvent> = parse_stream_line(
            r#"{"message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","prompt_eval_count":5,"eval_count":2}"#,
        )
        .into_iter()
        .map(|e| e.unwrap())
        .collect();
        assert_eq!(
            last,
            vec![StreamEvent::Done {
                usage: Some(Usage { tokens_in: 5, tokens_out: 2 }),
                stop_reason: Some("stop".into()),
            }]
        );
    }

    #[tokio::test]
    async fn unreachable_daemon_is_unavailable() {
        let settings = ProviderSettings {
            host: Some("http://127.0.0.1:1".into()),
            ..Default::default()
        };
        let p = provider(settings);
        assert!(!p.is_available().await);
        let err = p.chat(ChatRequest::new(vec![Message::user("hi")])).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }), "{err}");
    }

    // ── local daemon stand-in ──

    /// Serves `/api/tags` and answers `/api/chat` with `chunks`, one HTTP
    /// chunk each.
    async fn serve_chunks(chunks: Vec<Vec<u8>>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else { return };
                let chunks = chunks.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut byte = [0u8; 1];
                    while !head.ends_with(b"\r\n\r\n") {
                        if sock.read(&mut byte).await.unwrap_or(0) == 0 {
                            return;
                        }
                        head.push(byte[0]);
                    }
                    let head = String::from_utf8_lossy(&head).to_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    let mut body = vec![0u8; body_len];
                    sock.read_exact(&mut body).await.unwrap();

                    if head.starts_with("get /api/tags") {
                        let json = r#"{"models":[]}"#;
                        let resp = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{json}",
                            json.len()
                        );
                        sock.write_all(resp.as_bytes()).await.unwrap();
                        return;
                    }

                    sock.write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                    )
                    .await
                    .unwrap();
                    for chunk in chunks {
                        sock.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await.unwrap();
                        sock.write_all(&chunk).await.unwrap();
                        sock.write_all(b"\r\n").await.unwrap();
                        sock.flush().await.unwrap();
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    sock.write_all(b"0\r\n\r\n").await.unwrap();
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn stream_keeps_characters_split_across_chunks() {
        use futures_util::StreamExt;

        let body = concat!(
            "{\"message\":{\"content\":\"cost €5\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":3,\"eval_count\":2}\n",
        )
        .as_bytes();
        let cut = body.iter().position(|&b| b == 0xE2).unwrap() + 1;
        let host = serve_chunks(vec![body[..cut].to_vec(), body[cut..].to_vec()]).await;

        let p = provider(ProviderSettings { host: Some(host), ..Default::default() });
        let stream = p
            .chat_stream(ChatRequest::new(vec![Message::user("what did I spend?")]))
            .await
            .unwrap();
        let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "cost €5");
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })), "{events:?}");
    }
}
