//! System prompt assembly.

const PREAMBLE: &str = "\
You are a helpful personal financial assistant. You have access to tools that can query the user's financial data stored locally.

You can help with:
- Analyzing spending patterns and categories
- Portfolio and investment tracking
- Budget management and tracking
- Cryptocurrency holdings
- Storing and retrieving memories about goals, family, etc.
- Managing important financial documents

Always be helpful, accurate, and respect the user's privacy. All financial data stays on their local machine.

When using tools:
- Call the appropriate tool to get data before answering questions about finances
- Present data clearly with formatting when helpful
- Offer insights and suggestions when appropriate

Be concise but thorough. Use markdown formatting for readability.";

/// Caps keep the prompt small when callers hand over long lists.
const MAX_MEMORY_ITEMS: usize = 10;
const MAX_MEMORY_CHARS: usize = 100;
const MAX_ALERTS: usize = 5;

/// A remembered entity to surface in the prompt.
#[derive(Debug, Clone)]
pub struct MemoryItem {
    pub name: String,
    pub kind: String,
    pub note: Option<String>,
}

/// Builds the system prompt: fixed preamble plus optional context sections.
#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    memories: Vec<MemoryItem>,
    budget_alerts: Vec<String>,
}

impl SystemPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memories(mut self, memories: Vec<MemoryItem>) -> Self {
        self.memories = memories;
        self
    }

    pub fn with_budget_alerts(mut self, alerts: Vec<String>) -> Self {
        self.budget_alerts = alerts;
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::from(PREAMBLE);

        if !self.memories.is_empty() {
            out.push_str("\n\nUser Context (from memory):\n");
            for m in self.memories.iter().take(MAX_MEMORY_ITEMS) {
                out.push_str(&format!("- {} ({})", m.name, m.kind));
                if let Some(note) = &m.note {
                    let short: String = note.chars().take(MAX_MEMORY_CHARS).collect();
                    out.push_str(&format!(": {short}"));
                }
                out.push('\n');
            }
        }

        if !self.budget_alerts.is_empty() {
            out.push_str("\n\nBudget Alerts:\n");
            let lines: Vec<String> = self
                .budget_alerts
                .iter()
                .take(MAX_ALERTS)
                .map(|a| format!("- {a}"))
                .collect();
            out.push_str(&lines.join("\n"));
        }

        out
    }
}
