use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::tier::Tier;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The backends finai knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    ClaudeCli,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl ProviderKind {
    /// Registration order. The router falls back to the first available
    /// candidate in this order when no preference matches.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Anthropic,
        ProviderKind::ClaudeCli,
        ProviderKind::OpenAi,
        ProviderKind::Ollama,
    ];

    /// Stable identifier used in config sections and routing preferences.
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::ClaudeCli => "claude_cli",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    /// Hosted Anthropic is on unless turned off; everything else is opt-in.
    pub fn enabled_by_default(&self) -> bool {
        matches!(self, ProviderKind::Anthropic)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-provider settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One `[providers.<id>]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// `None` means "use the provider's default".
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Line-oriented `KEY=value` file holding the API key.
    #[serde(default)]
    pub api_key_file: Option<String>,
    /// Tier → model overrides, merged over the provider's defaults.
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    /// Ollama daemon URL.
    #[serde(default)]
    pub host: Option<String>,
    /// Override for hosted API base URLs.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Explicit path to the Claude CLI executable.
    #[serde(default)]
    pub cli_path: Option<String>,
    /// Request (or subprocess) timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Per-model pricing overrides (key = model name).
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

impl ProviderSettings {
    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.enabled.unwrap_or_else(|| kind.enabled_by_default())
    }

    /// Tier overrides with recognised keys only. Unknown keys are logged
    /// and ignored.
    pub fn tier_overrides(&self) -> Vec<(Tier, String)> {
        let mut out = Vec::new();
        for (key, model) in &self.models {
            match key.parse::<Tier>() {
                Ok(tier) => out.push((tier, model.clone())),
                Err(e) => tracing::warn!(key = %key, error = %e, "ignoring model override"),
            }
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pricing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per 1 million input (prompt) tokens.
    pub input_per_1m: f64,
    /// Dollars per 1 million output (completion) tokens.
    pub output_per_1m: f64,
}

impl ModelPricing {
    pub const fn new(input_per_1m: f64, output_per_1m: f64) -> Self {
        Self { input_per_1m, output_per_1m }
    }

    /// Calculate estimated cost in USD for the given token counts.
    pub fn estimate_cost(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        (tokens_in as f64 / 1_000_000.0) * self.input_per_1m
            + (tokens_out as f64 / 1_000_000.0) * self.output_per_1m
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
