use serde::Serialize;

use crate::tier::Tier;

/// Structured trace events emitted across all finai crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RouteDecided {
        provider: String,
        model: String,
        tier: Tier,
        needs_tools: bool,
        reason: String,
        preferred: Option<String>,
    },
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        tokens_in: u32,
        tokens_out: u32,
        cost: f64,
    },
    ToolInvoked {
        tool_name: String,
        call_id: String,
        is_error: bool,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "fa_event");
    }
}
