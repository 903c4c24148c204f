use clap::Parser;
use tracing_subscriber::EnvFilter;

use fa_assistant::cli::{Cli, Command, ConfigCommand};
use fa_assistant::{Assistant, ToolTable};
use fa_providers::SmartRouter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Classify { query } => fa_assistant::cli::inspect::classify(&query),
        Command::Route { query, prefer } => {
            let (config, _) = fa_assistant::cli::load_config(cli.config.as_deref())?;
            let router = SmartRouter::from_config(&config);
            fa_assistant::cli::inspect::route(&router, &query, prefer.as_deref()).await
        }
        Command::Providers => {
            let (config, _) = fa_assistant::cli::load_config(cli.config.as_deref())?;
            let router = SmartRouter::from_config(&config);
            fa_assistant::cli::inspect::providers(&router).await
        }
        Command::Ask { query, stream, prefer } => {
            let (config, _) = fa_assistant::cli::load_config(cli.config.as_deref())?;
            let assistant = Assistant::from_config(&config, ToolTable::new());
            if stream {
                fa_assistant::cli::ask::ask_streaming(&assistant, &query, prefer.as_deref()).await
            } else {
                fa_assistant::cli::ask::ask(&assistant, &query, prefer.as_deref()).await
            }
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, path) = fa_assistant::cli::load_config(cli.config.as_deref())?;
            if !fa_assistant::cli::config::validate(&config, path.as_deref()) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays clean for answers and JSON.
///
/// Defaults to `warn`; `RUST_LOG` overrides.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
