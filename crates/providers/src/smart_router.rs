//! Query routing across registered providers.
//!
//! Classify the query, pick an available provider that fits the query's
//! tool needs and the configured cost mode, then resolve the provider's
//! model for the classified tier.

use crate::classifier::{QueryClassification, QueryClassifier};
use crate::registry::ProviderRegistry;
use crate::traits::LlmProvider;
use fa_domain::config::{Config, CostMode};
use fa_domain::error::{Error, Result};
use fa_domain::trace::TraceEvent;
use std::fmt;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where one query goes. The provider handle is shared with the registry.
#[derive(Clone)]
pub struct RoutingDecision {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
    pub classification: QueryClassification,
}

impl fmt::Debug for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingDecision")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("classification", &self.classification)
            .finish()
    }
}

/// Provider names in preference order for a cost mode.
pub fn preference_order(mode: CostMode) -> &'static [&'static str] {
    match mode {
        CostMode::CostConscious => &["claude_cli", "ollama", "anthropic", "openai"],
        CostMode::Quality => &["anthropic", "openai", "claude_cli", "ollama"],
        CostMode::Balanced => &["claude_cli", "anthropic", "openai", "ollama"],
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SmartRouter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SmartRouter {
    registry: Arc<ProviderRegistry>,
    classifier: QueryClassifier,
    cost_mode: CostMode,
}

impl SmartRouter {
    pub fn new(registry: Arc<ProviderRegistry>, cost_mode: CostMode) -> Self {
        Self {
            registry,
            classifier: QueryClassifier::new(),
            cost_mode,
        }
    }

    /// Build the registry and router from one config tree.
    pub fn from_config(config: &Config) -> Self {
        let registry = Arc::new(ProviderRegistry::from_config(config));
        Self::new(registry, config.routing.cost_optimization)
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cost_mode(&self) -> CostMode {
        self.cost_mode
    }

    pub fn classify_query(&self, query: &str) -> QueryClassification {
        self.classifier.classify(query)
    }

    /// Names of registered providers that are available right now, in
    /// registry order. Probes run concurrently.
    pub async fn get_available_providers(&self) -> Vec<String> {
        self.available()
            .await
            .into_iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    async fn available(&self) -> Vec<Arc<dyn LlmProvider>> {
        let probes = self.registry.iter().map(|p| {
            let p = p.clone();
            async move {
                let up = p.is_available().await;
                (p, up)
            }
        });
        futures_util::future::join_all(probes)
            .await
            .into_iter()
            .filter_map(|(p, up)| up.then_some(p))
            .collect()
    }

    /// Classify `query` and choose a provider and model for it.
    ///
    /// `prefer` is a soft hint: it is honored only when that provider is
    /// registered, available, and able to take tools if the query needs them.
    pub async fn route(&self, query: &str, prefer: Option<&str>) -> Result<RoutingDecision> {
        let classification = self.classify_query(query);
        let provider = self.select_provider(&classification, prefer).await?;
        let model = provider.model_for_tier(classification.suggested_tier);

        tracing::info!(
            provider = provider.name(),
            model = %model,
            tier = %classification.suggested_tier,
            needs_tools = classification.needs_tools,
            "routed query"
        );
        TraceEvent::RouteDecided {
            provider: provider.name().to_string(),
            model: model.clone(),
            tier: classification.suggested_tier,
            needs_tools: classification.needs_tools,
            reason: classification.reason.clone(),
            preferred: prefer.map(String::from),
        }
        .emit();

        Ok(RoutingDecision { provider, model, classification })
    }

    pub async fn select_provider(
        &self,
        classification: &QueryClassification,
        prefer: Option<&str>,
    ) -> Result<Arc<dyn LlmProvider>> {
        if let Some(name) = prefer {
            match self.registry.get(name) {
                Some(p) if p.is_available().await => {
                    if !classification.needs_tools || p.supports_tools() {
                        return Ok(p);
                    }
                    tracing::debug!(provider = name, "preferred provider lacks tool support");
                }
                Some(_) => tracing::debug!(provider = name, "preferred provider unavailable"),
                None => tracing::debug!(provider = name, "preferred provider not registered"),
            }
        }

        let available = self.available().await;
        if available.is_empty() {
            return Err(Error::NoProviderAvailable(
                "No LLM providers available. Check configuration.".into(),
            ));
        }

        let mut candidates = available;
        if classification.needs_tools {
            let with_tools: Vec<_> = candidates.iter().filter(|p| p.supports_tools()).cloned().collect();
            if with_tools.is_empty() {
                tracing::warn!("no available provider supports tools, tools will not be offered");
            } else {
                candidates = with_tools;
            }
        }

        let chosen = preference_order(self.cost_mode)
            .iter()
            .find_map(|name| candidates.iter().find(|p| p.name() == *name))
            .unwrap_or(&candidates[0])
            .clone();
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_ranks_every_backend() {
        for mode in [CostMode::CostConscious, CostMode::Quality, CostMode::Balanced] {
            let mut names = preference_order(mode).to_vec();
            names.sort_unstable();
            assert_eq!(names, vec!["anthropic", "claude_cli", "ollama", "openai"]);
        }
    }

    #[tokio::test]
    async fn empty_registry_fails_to_route() {
        let router = SmartRouter::new(Arc::new(ProviderRegistry::default()), CostMode::Balanced);
        let err = router.route("hello", None).await.unwrap_err();
        assert!(matches!(err, Error::NoProviderAvailable(_)));
        assert_eq!(err.to_string(), "No LLM providers available. Check configuration.");
        assert!(router.get_available_providers().await.is_empty());
    }
}
