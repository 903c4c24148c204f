//! Read-only commands: `classify`, `route`, `providers`.

use anyhow::Context;
use serde_json::json;

use fa_providers::{QueryClassifier, SmartRouter};

pub fn classify(query: &str) -> anyhow::Result<()> {
    let c = QueryClassifier::new().classify(query);
    let out = serde_json::to_string_pretty(&c).context("serializing classification")?;
    println!("{out}");
    Ok(())
}

pub async fn route(router: &SmartRouter, query: &str, prefer: Option<&str>) -> anyhow::Result<()> {
    let d = router.route(query, prefer).await?;
    let out = json!({
        "provider": d.provider.name(),
        "model": d.model,
        "classification": d.classification,
        "cost_mode": router.cost_mode().as_str(),
    });
    println!("{}", serde_json::to_string_pretty(&out).context("serializing decision")?);
    Ok(())
}

pub async fn providers(router: &SmartRouter) -> anyhow::Result<()> {
    let registry = router.registry();
    if registry.is_empty() {
        println!("No providers registered. Check configuration.");
        return Ok(());
    }

    let available = router.get_available_providers().await;
    println!("{:<12} {:<10} {:<6} {}", "PROVIDER", "AVAILABLE", "TOOLS", "MODELS (simple / moderate / complex)");
    for p in registry.iter() {
        let models: Vec<String> = fa_domain::tier::Tier::ALL
            .iter()
            .map(|t| p.model_for_tier(*t))
            .collect();
        println!(
            "{:<12} {:<10} {:<6} {}",
            p.name(),
            if available.iter().any(|n| n == p.name()) { "yes" } else { "no" },
            if p.supports_tools() { "yes" } else { "no" },
            models.join(" / "),
        );
    }
    Ok(())
}
