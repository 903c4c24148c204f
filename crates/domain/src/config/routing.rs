use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub cost_optimization: CostMode,
    /// Hard cap on chat → tool → chat iterations per turn.
    #[serde(default = "d_max_tool_loops")]
    pub max_tool_loops: usize,
    /// How long a probed availability answer stays fresh.
    #[serde(default = "d_availability_ttl_secs")]
    pub availability_ttl_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cost_optimization: CostMode::default(),
            max_tool_loops: d_max_tool_loops(),
            availability_ttl_secs: d_availability_ttl_secs(),
        }
    }
}

fn d_max_tool_loops() -> usize {
    25
}
fn d_availability_ttl_secs() -> u64 {
    30
}

/// Provider preference policy used when several candidates qualify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum CostMode {
    /// Free local backends first.
    CostConscious,
    /// Strongest hosted models first.
    Quality,
    #[default]
    Balanced,
}

impl CostMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostMode::CostConscious => "cost_conscious",
            CostMode::Quality => "quality",
            CostMode::Balanced => "balanced",
        }
    }

    /// Lenient parse: anything unrecognised is `Balanced`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "cost_conscious" => CostMode::CostConscious,
            "quality" => CostMode::Quality,
            "balanced" => CostMode::Balanced,
            other => {
                tracing::warn!(mode = %other, "unknown cost_optimization mode, using balanced");
                CostMode::Balanced
            }
        }
    }
}

impl From<String> for CostMode {
    fn from(s: String) -> Self {
        Self::parse_lenient(&s)
    }
}

impl fmt::Display for CostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
