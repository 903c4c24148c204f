pub mod ask;
pub mod config;
pub mod inspect;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use fa_domain::config::Config;

/// finai — personal finance assistant with cost-aware model routing.
#[derive(Debug, Parser)]
#[command(name = "finai", version, about)]
pub struct Cli {
    /// Path to providers.toml (overrides FINAI_CONFIG and the default locations).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify a query and print the result as JSON.
    Classify {
        query: String,
    },
    /// Show which provider and model a query would be routed to.
    Route {
        query: String,
        /// Provider to try first (soft hint).
        #[arg(long)]
        prefer: Option<String>,
    },
    /// List registered providers with availability and tool support.
    Providers,
    /// Answer one query end to end.
    Ask {
        query: String,
        /// Print the answer as it streams in.
        #[arg(long)]
        stream: bool,
        /// Provider to try first (soft hint).
        #[arg(long)]
        prefer: Option<String>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
}

// ── Config loading ───────────────────────────────────────────────────

const CONFIG_ENV: &str = "FINAI_CONFIG";
const HOME_CONFIG: &str = ".private-financial-ai/config/providers.toml";
const LOCAL_CONFIG: &str = "config/providers.toml";

/// Pick the config file: `--config`, then `FINAI_CONFIG`, then the home
/// directory location, then `config/providers.toml`. Explicit choices are
/// returned even when the file is missing so that loading reports it.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(p));
    }
    let home = dirs::home_dir().map(|h| h.join(HOME_CONFIG));
    [home, Some(PathBuf::from(LOCAL_CONFIG))]
        .into_iter()
        .flatten()
        .find(|p| p.exists())
}

/// Load the configuration. With no config file at all the defaults apply.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let Some(path) = resolve_config_path(explicit) else {
        tracing::debug!("no config file found, using defaults");
        return Ok((Config::default(), None));
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");

    Ok((config, Some(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fa_domain::config::CostMode;

    #[test]
    fn explicit_path_wins() {
        let p = resolve_config_path(Some(Path::new("/tmp/x.toml")));
        assert_eq!(p, Some(PathBuf::from("/tmp/x.toml")));
    }

    #[test]
    fn loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.toml");
        std::fs::write(&path, "[routing]\ncost_optimization = \"quality\"\n").unwrap();

        let (config, used) = load_config(Some(&path)).unwrap();
        assert_eq!(config.routing.cost_optimization, CostMode::Quality);
        assert_eq!(used.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().starts_with("reading "), "{err}");
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[routing\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().starts_with("parsing "), "{err}");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["finai", "route", "balance?", "--prefer", "ollama"]).unwrap();
        match cli.command {
            Command::Route { query, prefer } => {
                assert_eq!(query, "balance?");
                assert_eq!(prefer.as_deref(), Some("ollama"));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["finai", "--json-logs", "config", "validate"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Validate)));
    }
}
