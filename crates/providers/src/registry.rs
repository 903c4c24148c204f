//! Provider registry.
//!
//! Instantiates every enabled backend from the [`Config`] in a fixed
//! order: anthropic, claude_cli, openai, ollama. A provider that fails to
//! construct is logged and skipped; the rest still load.

use crate::anthropic::AnthropicProvider;
use crate::claude_cli::ClaudeCliProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::traits::LlmProvider;
use fa_domain::config::{Config, ProviderKind};
use fa_domain::error::Result;
use std::sync::Arc;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered set of provider instances, keyed by [`LlmProvider::name`].
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Build the registry from configuration.
    ///
    /// Construction never fails as a whole: an empty registry is valid and
    /// surfaces later as "no provider available" at routing time.
    pub fn from_config(config: &Config) -> Self {
        let ttl = Duration::from_secs(config.routing.availability_ttl_secs);
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

        for kind in ProviderKind::ALL {
            let settings = match config.provider(kind) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(provider = kind.id(), error = %e, "bad provider config, skipping");
                    continue;
                }
            };
            if !settings.is_enabled(kind) {
                tracing::debug!(provider = kind.id(), "provider disabled");
                continue;
            }

            let result: Result<Arc<dyn LlmProvider>> = match kind {
                ProviderKind::Anthropic => {
                    AnthropicProvider::from_settings(&settings).map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
                ProviderKind::ClaudeCli => ClaudeCliProvider::from_settings(&settings, ttl)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::OpenAi => {
                    OpenAiProvider::from_settings(&settings).map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
                ProviderKind::Ollama => OllamaProvider::from_settings(&settings, ttl)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider = kind.id(), "registered LLM provider");
                    providers.push(provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = kind.id(),
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() {
            tracing::warn!("no LLM providers initialized; every query will fail to route");
        }

        Self { providers }
    }

    /// Wrap pre-built providers, keeping their order. Later duplicates of
    /// a name are dropped.
    pub fn from_providers(list: Vec<Arc<dyn LlmProvider>>) -> Self {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::with_capacity(list.len());
        for p in list {
            if providers.iter().any(|q| q.name() == p.name()) {
                tracing::warn!(provider = p.name(), "duplicate provider name, ignoring");
                continue;
            }
            providers.push(p);
        }
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn LlmProvider>> {
        self.providers.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml_src: &str) -> Config {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn defaults_register_only_anthropic() {
        let reg = ProviderRegistry::from_config(&Config::default());
        assert_eq!(reg.names(), vec!["anthropic"]);
    }

    #[test]
    fn registration_order_is_fixed() {
        let reg = ProviderRegistry::from_config(&config(
            r#"
            [providers.ollama]
            enabled = true
            [providers.openai]
            enabled = true
            [providers.claude_cli]
            enabled = true
            cli_path = "/nonexistent/claude"
            "#,
        ));
        assert_eq!(reg.names(), vec!["anthropic", "claude_cli", "openai", "ollama"]);
        assert!(reg.get("openai").is_some());
        assert!(reg.get("bedrock").is_none());
    }

    #[test]
    fn malformed_section_is_skipped() {
        let reg = ProviderRegistry::from_config(&config(
            r#"
            [providers.anthropic]
            enabled = false
            [providers.openai]
            enabled = "sometimes"
            [providers.ollama]
            enabled = true
            "#,
        ));
        assert_eq!(reg.names(), vec!["ollama"]);
    }

    #[test]
    fn from_providers_drops_duplicates() {
        let settings = Default::default();
        let a: Arc<dyn LlmProvider> =
            Arc::new(OpenAiProvider::with_api_key(None, &settings).unwrap());
        let b: Arc<dyn LlmProvider> =
            Arc::new(OpenAiProvider::with_api_key(None, &settings).unwrap());
        let reg = ProviderRegistry::from_providers(vec![a, b]);
        assert_eq!(reg.len(), 1);
    }
}
