//! Rule-based query classifier for tier routing.
//!
//! Classifies a user query into a complexity tier and decides whether it
//! needs financial-data tools. Pure pattern matching, no network.

use fa_domain::tier::Tier;
use regex::{RegexSet, RegexSetBuilder};
use serde::Serialize;
use std::sync::LazyLock;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pattern tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deep analysis, planning or advice.
pub const COMPLEX_PATTERNS: &[&str] = &[
    r"\b(optimize|optimization)\b",
    r"\b(strategy|strategies)\b",
    r"\b(recommend|recommendation|advice)\b",
    r"\b(analyze|analysis)\b",
    r"\b(compare|comparison)\b",
    r"\b(projection|forecast|predict)\b",
    r"\b(tax|taxes)\b.*\b(plan|strategy|optimize)\b",
    r"\b(retirement|retire)\b.*\b(plan|ready|enough)\b",
    r"\b(should i|what should)\b",
    r"\b(pros and cons|trade-?offs?)\b",
    r"\b(comprehensive|detailed|thorough)\b",
];

/// Aggregation and explanation.
pub const MODERATE_PATTERNS: &[&str] = &[
    r"\b(breakdown|break down)\b",
    r"\b(trend|trends|trending)\b",
    r"\b(summary|summarize)\b",
    r"\b(over time|month over month|year over year)\b",
    r"\b(category|categories)\b",
    r"\b(top \d+|biggest|largest|highest)\b",
    r"\b(vs|versus|compared to)\b",
    r"\b(why|how come)\b",
    r"\b(explain|understanding)\b",
];

/// Direct lookups.
pub const SIMPLE_PATTERNS: &[&str] = &[
    r"\b(balance|balances)\b",
    r"\b(how much|what is)\b.*\b(balance|total|value)\b",
    r"\b(list|show)\b.*\b(accounts?|transactions?)\b",
    r"\b(search|find)\b.*\b(transaction|purchase|charge)\b",
    r"\b(last|recent)\b.*\b(transaction|purchase)\b",
    r"\b(current|today)\b.*\b(balance|value)\b",
];

/// Any of these means the answer depends on the user's own data.
pub const TOOL_NEED_PATTERNS: &[&str] = &[
    r"\b(spend|spending|spent)\b",
    r"\b(balance|balances)\b",
    r"\b(transaction|transactions|purchase|purchases)\b",
    r"\b(portfolio|holdings|investments?)\b",
    r"\b(budget|budgets)\b",
    r"\b(income|salary|paycheck)\b",
    r"\b(crypto|bitcoin|ethereum)\b",
    r"\b(category|categories)\b",
    r"\b(account|accounts)\b",
    r"\b(net worth)\b",
    r"\b(cash flow)\b",
    r"\b(savings? rate)\b",
    r"\b(recurring|subscription)\b",
    r"\b(document|documents|vault)\b",
    r"\b(goal|goals)\b",
    r"\b(memory|remember)\b",
];

/// Greetings, thanks and meta questions.
pub const CONVERSATIONAL_PATTERNS: &[&str] = &[
    r"^(hi|hello|hey|good morning|good afternoon|good evening)",
    r"^(thanks|thank you|thx)",
    r"^(help|what can you do)",
    r"^(who are you|what are you)",
    r"\?$",
];

/// Lookups a small local model can answer.
pub const LOCAL_ELIGIBLE_PATTERNS: &[&str] = &[
    r"^(what is|show|list|get)\s+(my\s+)?(current\s+)?(balance|total)",
    r"^how much (do i have|is in)",
    r"^list (my\s+)?(accounts?|budgets?)",
];

/// Explicit time windows.
pub const TIME_PATTERNS: &[&str] = &[
    r"\b(last|past)\s+\d+\s+(months?|years?|weeks?)\b",
    r"\b(this|last|next)\s+(month|year|quarter)\b",
    r"\b(year to date|ytd|mtd)\b",
    r"\b(20\d{2})\b",
];

struct Patterns {
    complex: RegexSet,
    moderate: RegexSet,
    simple: RegexSet,
    tool_need: RegexSet,
    conversational: RegexSet,
    local_eligible: RegexSet,
    time: RegexSet,
}

fn compile(patterns: &[&str]) -> RegexSet {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("classifier pattern table must compile: {e}"))
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    complex: compile(COMPLEX_PATTERNS),
    moderate: compile(MODERATE_PATTERNS),
    simple: compile(SIMPLE_PATTERNS),
    tool_need: compile(TOOL_NEED_PATTERNS),
    conversational: compile(CONVERSATIONAL_PATTERNS),
    local_eligible: compile(LOCAL_ELIGIBLE_PATTERNS),
    time: compile(TIME_PATTERNS),
});

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryClassification {
    pub complexity: Tier,
    pub needs_tools: bool,
    pub suggested_tier: Tier,
    /// Which rule fired.
    pub reason: String,
}

impl QueryClassification {
    fn new(complexity: Tier, needs_tools: bool, reason: &str) -> Self {
        Self {
            complexity,
            needs_tools,
            suggested_tier: complexity,
            reason: reason.to_string(),
        }
    }
}

/// Stateless; all pattern tables are compiled once per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryClassifier;

impl QueryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// First matching rule wins. The query is trimmed and matched
    /// case-insensitively.
    pub fn classify(&self, query: &str) -> QueryClassification {
        let q = query.trim().to_lowercase();
        let p = &*PATTERNS;

        let needs_tools = p.tool_need.is_match(&q);

        if p.conversational.is_match(&q) && !needs_tools {
            return QueryClassification::new(
                Tier::Simple,
                false,
                "Conversational query, no financial data needed",
            );
        }

        if p.complex.is_match(&q) {
            return QueryClassification::new(Tier::Complex, needs_tools, "Complex query pattern detected");
        }

        if q.matches('?').count() > 1 {
            return QueryClassification::new(Tier::Moderate, needs_tools, "Multiple questions in query");
        }

        if q.split(" and ").count() > 2 {
            return QueryClassification::new(Tier::Moderate, needs_tools, "Multi-part query");
        }

        if p.time.is_match(&q) {
            // Complex patterns already returned above, so a time window
            // alone lands on moderate.
            return QueryClassification::new(Tier::Moderate, needs_tools, "Time-based analysis query");
        }

        if p.moderate.is_match(&q) {
            return QueryClassification::new(Tier::Moderate, needs_tools, "Moderate query pattern detected");
        }

        if p.simple.is_match(&q) {
            return QueryClassification::new(Tier::Simple, needs_tools, "Simple lookup query");
        }

        QueryClassification::new(Tier::Moderate, needs_tools, "Default classification")
    }

    pub fn needs_tools(&self, query: &str) -> bool {
        PATTERNS.tool_need.is_match(&query.trim().to_lowercase())
    }

    pub fn is_conversational(&self, query: &str) -> bool {
        PATTERNS.conversational.is_match(&query.trim().to_lowercase())
    }

    /// Whether a small local model could answer the query on its own.
    pub fn is_local_eligible(&self, query: &str) -> bool {
        PATTERNS.local_eligible.is_match(&query.trim().to_lowercase())
    }
}
