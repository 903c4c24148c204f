//! Routing across a registry of stub providers.
//!
//! Covers classification → provider selection → tier model resolution
//! without any network or subprocess access.

use fa_domain::config::{Config, CostMode};
use fa_domain::error::{Error, Result};
use fa_domain::stream::{BoxStream, StreamEvent};
use fa_domain::tier::Tier;
use fa_providers::usage::{UsageLog, UsageRecord};
use fa_providers::{ChatRequest, LlmProvider, LlmResponse, ProviderRegistry, SmartRouter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Stub {
    name: &'static str,
    available: AtomicBool,
    tools: bool,
}

fn stub(name: &'static str, available: bool, tools: bool) -> Arc<dyn LlmProvider> {
    Arc::new(Stub { name, available: AtomicBool::new(available), tools })
}

#[async_trait::async_trait]
impl LlmProvider for Stub {
    fn name(&self) -> &str {
        self.name
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn supports_tools(&self) -> bool {
        self.tools
    }

    fn model_for_tier(&self, tier: Tier) -> String {
        format!("{}-{tier}", self.name)
    }

    async fn chat(&self, _req: ChatRequest) -> Result<LlmResponse> {
        Ok(LlmResponse { content: "ok".into(), ..Default::default() })
    }

    async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        Err(Error::Other("not streamed".into()))
    }
}

fn router(providers: Vec<Arc<dyn LlmProvider>>, mode: CostMode) -> SmartRouter {
    SmartRouter::new(Arc::new(ProviderRegistry::from_providers(providers)), mode)
}

const TOOL_QUERY: &str = "What's my checking balance?";
const PLAIN_QUERY: &str = "tell me a story";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Availability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn only_unavailable_providers_is_an_error() {
    let r = router(
        vec![stub("anthropic", false, true), stub("ollama", false, false)],
        CostMode::Balanced,
    );
    let err = r.route(PLAIN_QUERY, None).await.unwrap_err();
    assert!(matches!(err, Error::NoProviderAvailable(_)), "{err}");
    assert!(r.get_available_providers().await.is_empty());
}

#[tokio::test]
async fn never_returns_unavailable_provider() {
    let r = router(
        vec![
            stub("claude_cli", false, true),
            stub("anthropic", false, true),
            stub("openai", true, true),
        ],
        CostMode::Balanced,
    );
    for q in [TOOL_QUERY, PLAIN_QUERY, "hi", "optimize my taxes"] {
        let d = r.route(q, None).await.unwrap();
        assert_eq!(d.provider.name(), "openai", "{q}");
    }
    assert_eq!(r.get_available_providers().await, vec!["openai"]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool filtering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_queries_skip_providers_without_tools() {
    let r = router(
        vec![stub("ollama", true, false), stub("openai", true, true)],
        CostMode::CostConscious,
    );
    let d = r.route(TOOL_QUERY, None).await.unwrap();
    assert!(d.classification.needs_tools);
    assert_eq!(d.provider.name(), "openai");

    // Without tool needs the cost order wins again.
    let d = r.route(PLAIN_QUERY, None).await.unwrap();
    assert_eq!(d.provider.name(), "ollama");
}

#[tokio::test]
async fn degrades_when_no_provider_has_tools() {
    let r = router(vec![stub("ollama", true, false)], CostMode::Balanced);
    let d = r.route(TOOL_QUERY, None).await.unwrap();
    assert_eq!(d.provider.name(), "ollama");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cost modes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn cli_and_anthropic() -> Vec<Arc<dyn LlmProvider>> {
    vec![stub("anthropic", true, true), stub("claude_cli", true, true)]
}

#[tokio::test]
async fn cost_conscious_prefers_cli() {
    let d = router(cli_and_anthropic(), CostMode::CostConscious)
        .route(TOOL_QUERY, None)
        .await
        .unwrap();
    assert_eq!(d.provider.name(), "claude_cli");
}

#[tokio::test]
async fn quality_prefers_anthropic() {
    let d = router(cli_and_anthropic(), CostMode::Quality)
        .route(TOOL_QUERY, None)
        .await
        .unwrap();
    assert_eq!(d.provider.name(), "anthropic");
}

#[tokio::test]
async fn balanced_prefers_cli_then_anthropic() {
    let d = router(cli_and_anthropic(), CostMode::Balanced)
        .route(PLAIN_QUERY, None)
        .await
        .unwrap();
    assert_eq!(d.provider.name(), "claude_cli");

    let d = router(
        vec![stub("ollama", true, true), stub("openai", true, true), stub("anthropic", true, true)],
        CostMode::Balanced,
    )
    .route(PLAIN_QUERY, None)
    .await
    .unwrap();
    assert_eq!(d.provider.name(), "anthropic");
}

#[tokio::test]
async fn unknown_names_fall_back_to_first_candidate() {
    let d = router(
        vec![stub("local-a", true, true), stub("local-b", true, true)],
        CostMode::Quality,
    )
    .route(PLAIN_QUERY, None)
    .await
    .unwrap();
    assert_eq!(d.provider.name(), "local-a");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Preference hint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn preferred_provider_is_used_when_eligible() {
    let r = router(
        vec![stub("anthropic", true, true), stub("ollama", true, false)],
        CostMode::Quality,
    );
    let d = r.route(PLAIN_QUERY, Some("ollama")).await.unwrap();
    assert_eq!(d.provider.name(), "ollama");
}

#[tokio::test]
async fn preference_yields_to_tool_needs() {
    let r = router(
        vec![stub("anthropic", true, true), stub("ollama", true, false)],
        CostMode::CostConscious,
    );
    let d = r.route(TOOL_QUERY, Some("ollama")).await.unwrap();
    assert_eq!(d.provider.name(), "anthropic");
}

#[tokio::test]
async fn unknown_or_unavailable_preference_is_ignored() {
    let r = router(
        vec![stub("anthropic", true, true), stub("openai", false, true)],
        CostMode::Balanced,
    );
    assert_eq!(r.route(PLAIN_QUERY, Some("openai")).await.unwrap().provider.name(), "anthropic");
    assert_eq!(r.route(PLAIN_QUERY, Some("bedrock")).await.unwrap().provider.name(), "anthropic");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// End to end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn balance_query_routes_to_simple_model() {
    let r = router(vec![stub("anthropic", true, true)], CostMode::Balanced);
    let d = r.route(TOOL_QUERY, None).await.unwrap();
    assert_eq!(d.classification.complexity, Tier::Simple);
    assert!(d.classification.needs_tools);
    assert_eq!(d.model, "anthropic-simple");

    let resp = d.provider.chat(ChatRequest::default().with_model(d.model.clone())).await.unwrap();
    let log = UsageLog::new(8);
    log.record(UsageRecord::now(d.provider.name(), &d.model, resp.tokens_in, resp.tokens_out, resp.cost));
    assert_eq!(log.recent(1)[0].model, "anthropic-simple");
}

#[tokio::test]
async fn analysis_query_routes_to_complex_model() {
    let r = router(vec![stub("claude_cli", true, true)], CostMode::Balanced);
    let d = r
        .route(
            "Can you analyze my spending trends over the last 6 months and recommend a budget strategy?",
            None,
        )
        .await
        .unwrap();
    assert_eq!(d.classification.complexity, Tier::Complex);
    assert!(d.classification.needs_tools);
    assert_eq!(d.model, "claude_cli-complex");
}

#[tokio::test]
async fn availability_changes_are_seen_on_next_route() {
    let anthropic = Arc::new(Stub { name: "anthropic", available: AtomicBool::new(true), tools: true });
    let r = router(vec![anthropic.clone() as Arc<dyn LlmProvider>, stub("openai", true, true)], CostMode::Quality);
    assert_eq!(r.route(PLAIN_QUERY, None).await.unwrap().provider.name(), "anthropic");

    anthropic.available.store(false, Ordering::SeqCst);
    assert_eq!(r.route(PLAIN_QUERY, None).await.unwrap().provider.name(), "openai");
}

#[tokio::test]
async fn router_from_default_config_registers_anthropic() {
    let r = SmartRouter::from_config(&Config::default());
    assert_eq!(r.registry().names(), vec!["anthropic"]);
    assert_eq!(r.cost_mode(), CostMode::Balanced);
}
