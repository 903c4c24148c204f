//! Turn execution: route one query, call the model, run any requested
//! tools, feed the results back, repeat until the model answers in text.
//!
//! [`Assistant::ask`] blocks until the final answer. [`Assistant::ask_streaming`]
//! runs the same loop on a background task and reports progress as a
//! channel of [`TurnEvent`]s.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use fa_domain::config::Config;
use fa_domain::error::{Error, Result};
use fa_domain::stream::{StreamEvent, Usage};
use fa_domain::tier::Tier;
use fa_domain::tool::{Message, ToolCall, ToolDefinition};
use fa_domain::trace::TraceEvent;
use fa_providers::usage::{UsageLog, UsageRecord};
use fa_providers::{ChatRequest, LlmProvider, QueryClassification, RoutingDecision, SmartRouter};

use crate::prompt::SystemPrompt;
use crate::tools::ToolTable;

const DEFAULT_MAX_TOOL_LOOPS: usize = 25;
const USAGE_LOG_CAPACITY: usize = 1_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a streamed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Routing picked this provider and model.
    #[serde(rename = "model")]
    Model { provider: String, model: String, tier: Tier },

    /// Incremental assistant text.
    #[serde(rename = "text")]
    Text { text: String },

    /// The model started a tool invocation.
    #[serde(rename = "tool_start")]
    ToolStart { id: String, name: String },

    /// A tool finished; `result` is what the model will see.
    #[serde(rename = "tool_result")]
    ToolResult {
        id: String,
        name: String,
        result: Value,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// Text of the last model response.
    #[serde(rename = "final")]
    Final { content: String },

    /// Totals for the whole turn.
    #[serde(rename = "usage")]
    Usage { tokens_in: u32, tokens_out: u32, cost: f64 },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Result of a blocking turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub classification: QueryClassification,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost: f64,
    /// Model calls made, including the final one.
    pub llm_calls: usize,
    pub tool_calls: usize,
}

/// Running totals across loop iterations.
#[derive(Debug, Default)]
struct Totals {
    usage: Usage,
    cost: f64,
    llm_calls: usize,
    tool_calls: usize,
}

impl Totals {
    fn add(&mut self, tokens_in: u32, tokens_out: u32, cost: f64) {
        self.usage.tokens_in += tokens_in;
        self.usage.tokens_out += tokens_out;
        self.cost += cost;
        self.llm_calls += 1;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assistant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Routes queries and runs the tool loop. Cheap to clone.
#[derive(Clone)]
pub struct Assistant {
    router: Arc<SmartRouter>,
    tools: Arc<ToolTable>,
    prompt: Arc<SystemPrompt>,
    usage: Arc<UsageLog>,
    max_tool_loops: usize,
}

impl Assistant {
    pub fn new(router: Arc<SmartRouter>, tools: ToolTable) -> Self {
        Self {
            router,
            tools: Arc::new(tools),
            prompt: Arc::new(SystemPrompt::new()),
            usage: Arc::new(UsageLog::new(USAGE_LOG_CAPACITY)),
            max_tool_loops: DEFAULT_MAX_TOOL_LOOPS,
        }
    }

    pub fn from_config(config: &Config, tools: ToolTable) -> Self {
        Self::new(Arc::new(SmartRouter::from_config(config)), tools)
            .with_max_tool_loops(config.routing.max_tool_loops)
    }

    pub fn with_prompt(mut self, prompt: SystemPrompt) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    pub fn with_max_tool_loops(mut self, n: usize) -> Self {
        self.max_tool_loops = n;
        self
    }

    pub fn with_usage_log(mut self, log: Arc<UsageLog>) -> Self {
        self.usage = log;
        self
    }

    pub fn router(&self) -> &Arc<SmartRouter> {
        &self.router
    }

    pub fn usage_log(&self) -> &Arc<UsageLog> {
        &self.usage
    }

    pub fn max_tool_loops(&self) -> usize {
        self.max_tool_loops
    }

    /// Tools are offered only when the query needs the user's data.
    fn tool_defs(&self, decision: &RoutingDecision) -> Vec<ToolDefinition> {
        if decision.classification.needs_tools {
            self.tools.definitions()
        } else {
            Vec::new()
        }
    }

    fn request(&self, messages: &[Message], system: &str, tools: &[ToolDefinition], model: &str) -> ChatRequest {
        ChatRequest::new(messages.to_vec())
            .with_system(system)
            .with_tools(tools.to_vec())
            .with_model(model)
    }

    fn loop_limit_error(&self) -> Error {
        Error::Other(format!(
            "tool loop limit reached after {} iterations",
            self.max_tool_loops
        ))
    }

    fn record_usage(&self, provider: &str, model: &str, totals: &Totals) {
        self.usage.record(UsageRecord::now(
            provider,
            model,
            totals.usage.tokens_in,
            totals.usage.tokens_out,
            totals.cost,
        ));
    }

    /// Execute the calls of one assistant turn in order and append one
    /// result message per call.
    async fn run_tools(
        &self,
        provider: &dyn LlmProvider,
        calls: &[ToolCall],
        messages: &mut Vec<Message>,
        tx: Option<&mpsc::Sender<TurnEvent>>,
    ) {
        for call in calls {
            let started = Instant::now();
            let outcome = self.tools.execute(&call.name, call.arguments.clone()).await;
            TraceEvent::ToolInvoked {
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
                is_error: outcome.is_error,
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();

            messages.push(provider.format_tool_result(&call.id, &outcome.value));
            if let Some(tx) = tx {
                let _ = tx
                    .send(TurnEvent::ToolResult {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        result: outcome.value,
                        is_error: outcome.is_error,
                    })
                    .await;
            }
        }
    }

    // ── Blocking turn ──────────────────────────────────────────────

    pub async fn ask(&self, query: &str, prefer: Option<&str>) -> Result<TurnOutcome> {
        let decision = self.router.route(query, prefer).await?;
        let provider = decision.provider.clone();
        let model = decision.model.clone();
        let tools = self.tool_defs(&decision);
        let system = self.prompt.render();

        let mut messages = vec![Message::user(query)];
        let mut totals = Totals::default();

        for loop_idx in 0..self.max_tool_loops {
            tracing::debug!(loop_idx, provider = provider.name(), "tool loop iteration");
            let started = Instant::now();
            let resp = provider
                .chat(self.request(&messages, &system, &tools, &model))
                .await?;
            TraceEvent::LlmRequest {
                provider: provider.name().to_string(),
                model: model.clone(),
                streaming: false,
                duration_ms: started.elapsed().as_millis() as u64,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                cost: resp.cost,
            }
            .emit();
            totals.add(resp.tokens_in, resp.tokens_out, resp.cost);

            if resp.tool_calls.is_empty() {
                self.record_usage(provider.name(), &model, &totals);
                return Ok(TurnOutcome {
                    content: resp.content,
                    provider: provider.name().to_string(),
                    model,
                    classification: decision.classification,
                    tokens_in: totals.usage.tokens_in,
                    tokens_out: totals.usage.tokens_out,
                    cost: totals.cost,
                    llm_calls: totals.llm_calls,
                    tool_calls: totals.tool_calls,
                });
            }

            totals.tool_calls += resp.tool_calls.len();
            messages.push(Message::assistant_with_tool_calls(&resp.content, &resp.tool_calls));
            self.run_tools(provider.as_ref(), &resp.tool_calls, &mut messages, None)
                .await;
        }

        self.record_usage(provider.name(), &model, &totals);
        tracing::warn!(max = self.max_tool_loops, "tool loop limit reached");
        Err(self.loop_limit_error())
    }

    // ── Streaming turn ─────────────────────────────────────────────

    /// Spawn the turn and return its event channel. The channel closes
    /// after `usage` (success) or `error`.
    pub fn ask_streaming(&self, query: String, prefer: Option<String>) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel::<TurnEvent>(64);
        let this = self.clone();

        tokio::spawn(async move {
            if let Err(e) = this.stream_turn(&query, prefer.as_deref(), &tx).await {
                tracing::warn!(error = %e, "streamed turn failed");
                let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
            }
        });

        rx
    }

    async fn stream_turn(
        &self,
        query: &str,
        prefer: Option<&str>,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<()> {
        let decision = self.router.route(query, prefer).await?;
        let provider = decision.provider.clone();
        let model = decision.model.clone();
        let tools = self.tool_defs(&decision);
        let system = self.prompt.render();

        let _ = tx
            .send(TurnEvent::Model {
                provider: provider.name().to_string(),
                model: model.clone(),
                tier: decision.classification.suggested_tier,
            })
            .await;

        let mut messages = vec![Message::user(query)];
        let mut totals = Totals::default();

        for loop_idx in 0..self.max_tool_loops {
            if tx.is_closed() {
                tracing::debug!("turn receiver dropped, stopping");
                return Ok(());
            }
            tracing::debug!(loop_idx, provider = provider.name(), "tool loop iteration");

            let started = Instant::now();
            let mut stream = provider
                .chat_stream(self.request(&messages, &system, &tools, &model))
                .await?;

            let mut text_buf = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut usage: Option<Usage> = None;

            while let Some(event) = stream.next().await {
                match event? {
                    StreamEvent::Text { text } => {
                        text_buf.push_str(&text);
                        let _ = tx.send(TurnEvent::Text { text }).await;
                    }
                    StreamEvent::ToolStart { id, name } => {
                        let _ = tx.send(TurnEvent::ToolStart { id, name }).await;
                    }
                    StreamEvent::ToolCall { id, name, arguments } => {
                        calls.push(ToolCall { id, name, arguments });
                    }
                    StreamEvent::Done { usage: u, .. } => {
                        usage = u;
                        break;
                    }
                    StreamEvent::Error { message } => {
                        return Err(Error::Provider {
                            provider: provider.name().to_string(),
                            message,
                        });
                    }
                }
            }
            drop(stream);

            let usage = usage.unwrap_or_default();
            let cost = provider.calculate_cost(usage.tokens_in, usage.tokens_out, &model);
            TraceEvent::LlmRequest {
                provider: provider.name().to_string(),
                model: model.clone(),
                streaming: true,
                duration_ms: started.elapsed().as_millis() as u64,
                tokens_in: usage.tokens_in,
                tokens_out: usage.tokens_out,
                cost,
            }
            .emit();
            totals.add(usage.tokens_in, usage.tokens_out, cost);

            if calls.is_empty() {
                self.record_usage(provider.name(), &model, &totals);
                let _ = tx.send(TurnEvent::Final { content: text_buf }).await;
                let _ = tx
                    .send(TurnEvent::Usage {
                        tokens_in: totals.usage.tokens_in,
                        tokens_out: totals.usage.tokens_out,
                        cost: totals.cost,
                    })
                    .await;
                return Ok(());
            }

            totals.tool_calls += calls.len();
            messages.push(Message::assistant_with_tool_calls(&text_buf, &calls));
            self.run_tools(provider.as_ref(), &calls, &mut messages, Some(tx))
                .await;
        }

        self.record_usage(provider.name(), &model, &totals);
        Err(self.loop_limit_error())
    }
}
