//! Tier → model tables and per-model pricing lookups.

use fa_domain::config::ModelPricing;
use fa_domain::tier::Tier;
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier models
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Concrete model per tier for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierModels {
    simple: String,
    moderate: String,
    complex: String,
}

impl TierModels {
    pub fn new(simple: &str, moderate: &str, complex: &str) -> Self {
        Self {
            simple: simple.to_string(),
            moderate: moderate.to_string(),
            complex: complex.to_string(),
        }
    }

    /// Apply config overrides on top of the defaults.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = (Tier, String)>) -> Self {
        for (tier, model) in overrides {
            *self.slot_mut(tier) = model;
        }
        self
    }

    pub fn get(&self, tier: Tier) -> &str {
        match tier {
            Tier::Simple => &self.simple,
            Tier::Moderate => &self.moderate,
            Tier::Complex => &self.complex,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, &str)> {
        Tier::ALL.into_iter().map(move |t| (t, self.get(t)))
    }

    /// Rewrite every model in place.
    pub fn map(mut self, f: impl Fn(String) -> String) -> Self {
        self.simple = f(self.simple);
        self.moderate = f(self.moderate);
        self.complex = f(self.complex);
        self
    }

    fn slot_mut(&mut self, tier: Tier) -> &mut String {
        match tier {
            Tier::Simple => &mut self.simple,
            Tier::Moderate => &mut self.moderate,
            Tier::Complex => &mut self.complex,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pricing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered pricing table.
///
/// Lookup is an exact name match first, then the first entry whose key is
/// a substring of the lower-cased model name. Order matters for the
/// substring pass: more specific keys must come first.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    entries: Vec<(String, ModelPricing)>,
}

impl PricingTable {
    pub fn from_static(entries: &[(&str, f64, f64)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(k, i, o)| (k.to_string(), ModelPricing::new(*i, *o)))
                .collect(),
        }
    }

    /// Config overrides take precedence over the built-in entries.
    pub fn with_overrides(mut self, overrides: &HashMap<String, ModelPricing>) -> Self {
        if overrides.is_empty() {
            return self;
        }
        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        let mut merged: Vec<(String, ModelPricing)> =
            keys.into_iter().map(|k| (k.clone(), overrides[k])).collect();
        merged.append(&mut self.entries);
        self.entries = merged;
        self
    }

    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        if let Some((_, p)) = self.entries.iter().find(|(k, _)| k == model) {
            return Some(*p);
        }
        let lowered = model.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| lowered.contains(k.as_str()))
            .map(|(_, p)| *p)
    }

    /// Estimated USD cost; 0.0 when the model is not in the table.
    pub fn cost(&self, tokens_in: u32, tokens_out: u32, model: &str) -> f64 {
        self.lookup(model)
            .map(|p| p.estimate_cost(tokens_in, tokens_out))
            .unwrap_or(0.0)
    }
}
