use fa_domain::config::{Config, ConfigSeverity, CostMode, ProviderKind};
use fa_domain::tier::Tier;

#[test]
fn empty_file_gives_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.routing.cost_optimization, CostMode::Balanced);
    assert_eq!(config.routing.max_tool_loops, 25);
    assert!(config.providers.is_empty());
}

#[test]
fn full_provider_file_parses() {
    let toml_str = r#"
[routing]
cost_optimization = "quality"

[providers.anthropic]
enabled = true
api_key_file = "~/.private-financial-ai/secrets/api_keys.env"
timeout_secs = 120

[providers.anthropic.models]
simple = "claude-haiku-4-5-20250514"

[providers.anthropic.pricing."claude-sonnet-4-20250514"]
input_per_1m = 3.0
output_per_1m = 15.0

[providers.ollama]
enabled = true
host = "http://localhost:11434"

[providers.claude_cli]
enabled = true
cli_path = "/usr/local/bin/claude"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.routing.cost_optimization, CostMode::Quality);

    let anthropic = config.provider(ProviderKind::Anthropic).unwrap();
    assert_eq!(anthropic.timeout_secs, Some(120));
    assert_eq!(
        anthropic.tier_overrides(),
        vec![(Tier::Simple, "claude-haiku-4-5-20250514".to_string())]
    );
    let sonnet = anthropic.pricing["claude-sonnet-4-20250514"];
    assert!((sonnet.estimate_cost(1000, 500) - 0.0105).abs() < 1e-12);

    let ollama = config.provider(ProviderKind::Ollama).unwrap();
    assert!(ollama.is_enabled(ProviderKind::Ollama));
    assert_eq!(ollama.host.as_deref(), Some("http://localhost:11434"));

    let cli = config.provider(ProviderKind::ClaudeCli).unwrap();
    assert_eq!(cli.cli_path.as_deref(), Some("/usr/local/bin/claude"));

    // No [providers.openai] section: defaults, disabled.
    let openai = config.provider(ProviderKind::OpenAi).unwrap();
    assert!(!openai.is_enabled(ProviderKind::OpenAi));

    assert!(config.validate().is_empty(), "{:?}", config.validate());
}

#[test]
fn malformed_section_only_affects_its_provider() {
    let toml_str = r#"
[providers.ollama]
enabled = "yes please"

[providers.anthropic]
enabled = true
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.provider(ProviderKind::Ollama).is_err());
    assert!(config.provider(ProviderKind::Anthropic).is_ok());

    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.severity == ConfigSeverity::Error && e.field == "providers.ollama"));
}

#[test]
fn validate_flags_bad_values() {
    let toml_str = r#"
[routing]
max_tool_loops = 0

[providers.ollama]
enabled = true
host = "localhost:11434"

[providers.ollama.models]
reasoning = "deepseek-r1"

[providers.gemini]
enabled = true
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    let fields: Vec<&str> = issues.iter().map(|e| e.field.as_str()).collect();
    assert!(fields.contains(&"routing.max_tool_loops"));
    assert!(fields.contains(&"providers.ollama.host"));
    assert!(fields.contains(&"providers.ollama.models.reasoning"));
    assert!(fields.contains(&"providers.gemini"));
}

#[test]
fn warns_when_everything_disabled() {
    let toml_str = r#"
[providers.anthropic]
enabled = false
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert_eq!(issues[0].to_string(), "[WARN] providers: no LLM providers enabled");
}
