use fa_domain::error::Result;
use fa_domain::stream::{BoxStream, StreamEvent};
use fa_domain::tier::Tier;
use fa_domain::tool::{render_tool_output, Message, ToolCall, ToolDefinition};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation so far, oldest first.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// System prompt, sent the way each backend expects it.
    pub system: Option<String>,
    /// Concrete model identifier. When `None`, the provider uses its
    /// `moderate` tier model.
    pub model: Option<String>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, ..Default::default() }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// The normalized result of a blocking chat call.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    /// The model the request was issued against.
    pub model: String,
    /// 0 when the backend does not report usage.
    pub tokens_in: u32,
    pub tokens_out: u32,
    /// USD; 0.0 for free or unpriced models.
    pub cost: f64,
    /// Requested tool invocations, in the order the model emitted them.
    pub tool_calls: Vec<ToolCall>,
    /// Backend-specific and opaque.
    pub stop_reason: String,
    /// Backend-native payload. Diagnostic only.
    pub raw: Option<Value>,
}

/// What [`LlmProvider::send`] hands back.
pub enum ChatReply {
    Complete(LlmResponse),
    Stream(BoxStream<'static, Result<StreamEvent>>),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatReply::Complete(r) => f.debug_tuple("Complete").field(r).finish(),
            ChatReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM backend must implement.
///
/// Implementations translate between the universal message / tool shapes
/// in `fa_domain` and the wire format of one backend. The router and the
/// tool loop only ever see `Arc<dyn LlmProvider>`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable identifier used in config sections and routing preferences.
    fn name(&self) -> &str;

    /// Whether the provider is configured and reachable. Never fails;
    /// probe errors collapse to `false`.
    async fn is_available(&self) -> bool;

    /// Whether tool definitions can be sent in the current configuration.
    fn supports_tools(&self) -> bool;

    /// Concrete model for an abstract tier.
    fn model_for_tier(&self, tier: Tier) -> String;

    /// Like [`model_for_tier`](Self::model_for_tier) but for a free-form
    /// tier name; anything unrecognised maps to `moderate`.
    fn model_for_tier_name(&self, tier: &str) -> String {
        self.model_for_tier(tier.parse().unwrap_or(Tier::Moderate))
    }

    /// Estimated USD cost. Unpriced models cost nothing.
    fn calculate_cost(&self, _tokens_in: u32, _tokens_out: u32, _model: &str) -> f64 {
        0.0
    }

    /// Send a chat request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<LlmResponse>;

    /// Send a chat request and return a stream of events.
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// Wrap a tool's output in the message shape this backend expects when
    /// the conversation continues.
    fn format_tool_result(&self, tool_call_id: &str, result: &Value) -> Message {
        Message::tool_result(tool_call_id, render_tool_output(result))
    }

    /// Unified entry point: blocking or streaming depending on `stream`.
    async fn send(&self, req: ChatRequest, stream: bool) -> Result<ChatReply> {
        if stream {
            self.chat_stream(req).await.map(ChatReply::Stream)
        } else {
            self.chat(req).await.map(ChatReply::Complete)
        }
    }
}
