//! `finai ask` — one query, printed to stdout.

use std::io::Write;

use crate::turn::{Assistant, TurnEvent};

pub async fn ask(assistant: &Assistant, query: &str, prefer: Option<&str>) -> anyhow::Result<()> {
    let out = assistant.ask(query, prefer).await?;
    println!("{}", out.content.trim_end());
    eprintln!(
        "\x1b[2m[{} {} · {} in / {} out · ${:.4}]\x1b[0m",
        out.provider, out.model, out.tokens_in, out.tokens_out, out.cost
    );
    Ok(())
}

pub async fn ask_streaming(
    assistant: &Assistant,
    query: &str,
    prefer: Option<&str>,
) -> anyhow::Result<()> {
    let mut rx = assistant.ask_streaming(query.to_string(), prefer.map(String::from));
    let mut failed: Option<String> = None;

    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Model { provider, model, .. } => {
                eprintln!("\x1b[2m[{provider} {model}]\x1b[0m");
            }
            TurnEvent::Text { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            TurnEvent::ToolStart { name, .. } => {
                eprintln!("\x1b[2m[tool: {name}]\x1b[0m");
            }
            TurnEvent::ToolResult { name, is_error: true, .. } => {
                eprintln!("\x1b[2m[tool {name} failed]\x1b[0m");
            }
            TurnEvent::ToolResult { .. } => {}
            TurnEvent::Final { .. } => println!(),
            TurnEvent::Usage { tokens_in, tokens_out, cost } => {
                eprintln!("\x1b[2m[{tokens_in} in / {tokens_out} out · ${cost:.4}]\x1b[0m");
            }
            TurnEvent::Error { message } => failed = Some(message),
        }
    }

    match failed {
        Some(message) => anyhow::bail!(message),
        None => Ok(()),
    }
}
