//! Tool table for the assistant loop.
//!
//! Whoever assembles the finance tool catalogue registers one handler per
//! tool name. Failures never abort a turn: they come back as an
//! `{"error": ...}` payload that is fed to the model like any other result.

use fa_domain::tool::ToolDefinition;
use serde_json::{json, Value};
use std::sync::Arc;

/// One callable tool.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with its argument mapping. `Err` carries a message for
    /// the model, not a Rust error chain.
    async fn invoke(&self, arguments: Value) -> Result<Value, String>;
}

/// Outcome of one tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub value: Value,
    pub is_error: bool,
}

/// Ordered name → handler table.
#[derive(Default, Clone)]
pub struct ToolTable {
    handlers: Vec<(String, Arc<dyn ToolHandler>)>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its definition's name. A second handler
    /// with the same name replaces the first in place.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let name = handler.definition().name;
        match self.handlers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                tracing::warn!(tool = %name, "tool registered twice, replacing");
                slot.1 = handler;
            }
            None => self.handlers.push((name, handler)),
        }
        self
    }

    pub fn with(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.iter().map(|(_, h)| h.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> ToolOutcome {
        let Some((_, handler)) = self.handlers.iter().find(|(n, _)| n == name) else {
            tracing::warn!(tool = %name, "model requested an unknown tool");
            return ToolOutcome {
                value: json!({ "error": format!("Unknown tool: {name}") }),
                is_error: true,
            };
        };

        match handler.invoke(arguments).await {
            Ok(value) => {
                // Handlers may report their own failures the same way.
                let is_error = value.get("error").is_some();
                ToolOutcome { value, is_error }
            }
            Err(msg) => {
                tracing::warn!(tool = %name, error = %msg, "tool failed");
                ToolOutcome {
                    value: json!({ "error": format!("Tool error: {msg}") }),
                    is_error: true,
                }
            }
        }
    }
}

/// Handler backed by a plain closure. Handy for small tools and tests.
pub struct FnTool<F> {
    definition: ToolDefinition,
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    pub fn new(name: &str, description: &str, input_schema: Value, f: F) -> Arc<Self> {
        Arc::new(Self {
            definition: ToolDefinition {
                name: name.to_string(),
                description: description.to_string(),
                input_schema,
            },
            f,
        })
    }
}

#[async_trait::async_trait]
impl<F> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, String> {
        (self.f)(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ToolTable {
        ToolTable::new()
            .with(FnTool::new(
                "get_account_balances",
                "Balances per account",
                json!({"type": "object", "properties": {}}),
                |_| Ok(json!({"checking": 1520.25})),
            ))
            .with(FnTool::new(
                "search_transactions",
                "Search by merchant",
                json!({"type": "object", "properties": {"query": {"type": "string"}}}),
                |args| match args.get("query").and_then(|q| q.as_str()) {
                    Some(q) => Ok(json!({"query": q, "matches": 0})),
                    None => Err("missing query".into()),
                },
            ))
    }

    #[tokio::test]
    async fn executes_known_tool() {
        let out = table().execute("get_account_balances", json!({})).await;
        assert!(!out.is_error);
        assert_eq!(out.value["checking"], 1520.25);
    }

    #[tokio::test]
    async fn unknown_tool_is_error_payload() {
        let out = table().execute("wire_money", json!({})).await;
        assert!(out.is_error);
        assert_eq!(out.value, json!({"error": "Unknown tool: wire_money"}));
    }

    #[tokio::test]
    async fn handler_failure_is_error_payload() {
        let out = table().execute("search_transactions", json!({})).await;
        assert!(out.is_error);
        assert_eq!(out.value, json!({"error": "Tool error: missing query"}));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let names: Vec<_> = table().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["get_account_balances", "search_transactions"]);
    }

    #[test]
    fn re_registering_replaces() {
        let mut t = table();
        t.register(FnTool::new("get_account_balances", "v2", json!({}), |_| Ok(json!(0))));
        assert_eq!(t.len(), 2);
        assert_eq!(t.definitions()[0].description, "v2");
    }
}
