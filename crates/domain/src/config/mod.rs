mod providers;
mod routing;

pub use providers::*;
pub use routing::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Raw `[providers.<id>]` sections. Kept untyped so that one malformed
    /// section only knocks out its own provider.
    #[serde(default)]
    pub providers: BTreeMap<String, serde_json::Value>,
}

impl Config {
    /// Typed settings for one provider. A missing section yields defaults.
    pub fn provider(&self, kind: ProviderKind) -> Result<ProviderSettings, String> {
        match self.providers.get(kind.id()) {
            None => Ok(ProviderSettings::default()),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| format!("invalid [providers.{}] section: {e}", kind.id())),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.routing.max_tool_loops == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "routing.max_tool_loops".into(),
                message: "max_tool_loops must be greater than 0".into(),
            });
        }

        if self.routing.availability_ttl_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "routing.availability_ttl_secs".into(),
                message: "0 disables caching; every route re-probes local providers".into(),
            });
        }

        // Sections nobody will read.
        for id in self.providers.keys() {
            if ProviderKind::from_id(id).is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("providers.{id}"),
                    message: "unknown provider, section ignored".into(),
                });
            }
        }

        let mut any_enabled = false;
        for kind in ProviderKind::ALL {
            let settings = match self.provider(kind) {
                Ok(s) => s,
                Err(message) => {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("providers.{}", kind.id()),
                        message,
                    });
                    continue;
                }
            };
            if !settings.is_enabled(kind) {
                continue;
            }
            any_enabled = true;

            for key in settings.models.keys() {
                if key.parse::<crate::tier::Tier>().is_err() {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Warning,
                        field: format!("providers.{}.models.{key}", kind.id()),
                        message: "not a tier (simple, moderate, complex)".into(),
                    });
                }
            }

            if let Some(host) = &settings.host {
                if !host.starts_with("http://") && !host.starts_with("https://") {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("providers.{}.host", kind.id()),
                        message: "host must be an http(s) URL".into(),
                    });
                }
            }

            if settings.timeout_secs == Some(0) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.{}.timeout_secs", kind.id()),
                    message: "timeout must be greater than 0".into(),
                });
            }

            for (model, pricing) in &settings.pricing {
                if pricing.input_per_1m < 0.0 || pricing.output_per_1m < 0.0 {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("providers.{}.pricing.{model}", kind.id()),
                        message: "prices must not be negative".into(),
                    });
                }
            }
        }

        if !any_enabled {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "providers".into(),
                message: "no LLM providers enabled".into(),
            });
        }

        errors
    }
}
