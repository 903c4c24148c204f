//! Claude command-line tool as a provider.
//!
//! The CLI has no multi-turn protocol, so the whole conversation is
//! flattened into one prompt per invocation. Usage is covered by the
//! user's subscription: cost is always zero and token counts are
//! estimated.

use crate::availability::AvailabilityCache;
use crate::models::TierModels;
use crate::traits::{ChatRequest, LlmProvider, LlmResponse};
use crate::util::{expand_home, find_on_path, is_executable};
use fa_domain::config::ProviderSettings;
use fa_domain::error::{Error, Result};
use fa_domain::stream::{BoxStream, StreamEvent};
use fa_domain::tier::Tier;
use fa_domain::tool::{Message, Role, ToolCall};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

pub const PROVIDER_NAME: &str = "claude_cli";

const MODEL_PREFIX: &str = "cli:";
const AUTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub struct ClaudeCliProvider {
    cli_path: Option<PathBuf>,
    models: TierModels,
    availability: AvailabilityCache,
    timeout: Duration,
}

impl ClaudeCliProvider {
    pub fn from_settings(settings: &ProviderSettings, availability_ttl: Duration) -> Result<Self> {
        let cli_path = match &settings.cli_path {
            Some(p) => Some(expand_home(p)),
            None => locate_cli(),
        };
        if cli_path.is_none() {
            tracing::info!(provider = PROVIDER_NAME, "claude executable not found");
        }

        Ok(Self {
            cli_path,
            models: TierModels::new("haiku", "sonnet", "opus")
                .with_overrides(settings.tier_overrides())
                .map(|m| strip_prefix(&m).to_string()),
            availability: AvailabilityCache::new(availability_ttl),
            timeout: Duration::from_secs(settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    pub fn cli_path(&self) -> Option<&Path> {
        self.cli_path.as_deref()
    }

    /// `claude auth status` must exit 0 within the auth-check window.
    async fn probe(&self) -> bool {
        let Some(path) = &self.cli_path else {
            return false;
        };
        let status = Command::new(path)
            .args(["auth", "status"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        match tokio::time::timeout(AUTH_CHECK_TIMEOUT, status).await {
            Ok(Ok(s)) => s.success(),
            Ok(Err(e)) => {
                tracing::debug!(provider = PROVIDER_NAME, error = %e, "auth status failed to run");
                false
            }
            Err(_) => {
                tracing::debug!(provider = PROVIDER_NAME, "auth status timed out");
                false
            }
        }
    }

    async fn prepare(&self, req: &ChatRequest) -> Result<(PathBuf, String, String)> {
        let path = match (&self.cli_path, self.is_available().await) {
            (Some(path), true) => path.clone(),
            _ => {
                return Err(Error::Unavailable {
                    provider: PROVIDER_NAME.into(),
                    reason: "claude CLI not installed or not authenticated".into(),
                })
            }
        };
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.model_for_tier(Tier::Moderate));
        let prompt = flatten_messages(&req.messages, req.system.as_deref());
        Ok((path, model, prompt))
    }
}

/// `claude` on `PATH`, then the npm global prefix.
fn locate_cli() -> Option<PathBuf> {
    find_on_path("claude").or_else(|| {
        let npm = dirs::home_dir()?.join(".npm-global/bin/claude");
        is_executable(&npm).then_some(npm)
    })
}

fn strip_prefix(model: &str) -> &str {
    model.strip_prefix(MODEL_PREFIX).unwrap_or(model)
}

/// Flatten a role-tagged conversation into one prompt.
pub fn flatten_messages(messages: &[Message], system: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        parts.push(format!("System: {system}\n"));
    }
    for msg in messages {
        let text = msg.content.extract_all_text();
        let line = match msg.role {
            Role::System => format!("System: {text}\n"),
            _ if msg.content.is_tool_results() => format!("Tool Result: {text}"),
            Role::Tool => format!("Tool Result: {text}"),
            Role::User => format!("User: {text}"),
            Role::Assistant => format!("Assistant: {text}"),
        };
        parts.push(line);
    }
    parts.join("\n\n")
}

/// Interpret `--output-format json` stdout. Non-JSON output is taken as
/// the answer verbatim.
pub(crate) fn parse_cli_output(stdout: &str) -> (String, Vec<ToolCall>) {
    let data: Value = match serde_json::from_str(stdout) {
        Ok(v @ Value::Object(_)) => v,
        _ => {
            tracing::debug!(provider = PROVIDER_NAME, "CLI output is not a JSON object, using raw text");
            return (stdout.to_string(), Vec::new());
        }
    };

    let content = data
        .get("result")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| stdout.to_string());

    let tool_calls = data
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(i, tc)| {
                    Some(ToolCall {
                        id: tc
                            .get("id")
                            .and_then(|v| v.as_str())
                            .map(String::from)
                            .unwrap_or_else(|| format!("call_{i}")),
                        name: tc.get("name")?.as_str()?.to_string(),
                        arguments: tc
                            .get("arguments")
                            .or_else(|| tc.get("input"))
                            .cloned()
                            .filter(|a| a.is_object())
                            .unwrap_or(Value::Object(Default::default())),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    (content, tool_calls)
}

fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() / 4) as u32
}

#[async_trait::async_trait]
impl LlmProvider for ClaudeCliProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        if self.cli_path.is_none() {
            return false;
        }
        self.availability.get_or_probe(|| self.probe()).await
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn model_for_tier(&self, tier: Tier) -> String {
        format!("{MODEL_PREFIX}{}", self.models.get(tier))
    }

    async fn chat(&self, req: ChatRequest) -> Result<LlmResponse> {
        let (path, model, prompt) = self.prepare(&req).await?;
        tracing::debug!(provider = PROVIDER_NAME, model = %model, prompt_chars = prompt.len(), "invoking claude CLI");

        let output = Command::new(&path)
            .args(["--print", "--model", strip_prefix(&model), "--output-format", "json"])
            .arg(&prompt)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "claude CLI did not finish within {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            return Err(Error::Provider {
                provider: PROVIDER_NAME.into(),
                message: format!(
                    "CLI exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (content, tool_calls) = parse_cli_output(&stdout);

        Ok(LlmResponse {
            tokens_in: estimate_tokens(&prompt),
            tokens_out: estimate_tokens(&content),
            content,
            model,
            cost: 0.0,
            tool_calls,
            stop_reason: "end_turn".into(),
            raw: serde_json::from_str(&stdout).ok(),
        })
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let (path, model, prompt) = self.prepare(&req).await?;
        let timeout = self.timeout;

        let stream = async_stream::stream! {
            let spawned = Command::new(&path)
                .args(["--print", "--model", strip_prefix(&model)])
                .arg(&prompt)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();

            let mut child = match spawned {
                Ok(c) => c,
                Err(e) => {
                    yield Ok(StreamEvent::Error { message: format!("failed to start claude CLI: {e}") });
                    return;
                }
            };

            let Some(stdout) = child.stdout.take() else {
                yield Ok(StreamEvent::Error { message: "claude CLI stdout unavailable".into() });
                return;
            };
            // Drained alongside stdout: a full stderr pipe would block the child.
            let stderr_task = child.stderr.take().map(|mut err| {
                tokio::spawn(async move {
                    let mut buf = String::new();
                    let _ = err.read_to_string(&mut buf).await;
                    buf
                })
            });
            let mut lines = BufReader::new(stdout).lines();
            let deadline = tokio::time::Instant::now() + timeout;

            loop {
                match tokio::time::timeout_at(deadline, lines.next_line()).await {
                    Ok(Ok(Some(line))) => {
                        if !line.trim().is_empty() {
                            yield Ok(StreamEvent::Text { text: format!("{line}\n") });
                        }
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        yield Err(Error::Io(e));
                        return;
                    }
                    Err(_) => {
                        yield Err(Error::Timeout(format!(
                            "claude CLI did not finish within {}s",
                            timeout.as_secs()
                        )));
                        return;
                    }
                }
            }

            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) if status.success() => {
                    yield Ok(StreamEvent::Done { usage: None, stop_reason: Some("end_turn".into()) });
                }
                Ok(Ok(status)) => {
                    let stderr = match stderr_task {
                        Some(task) => task.await.unwrap_or_default(),
                        None => String::new(),
                    };
                    yield Ok(StreamEvent::Error {
                        message: format!("CLI exited with {status}: {}", stderr.trim()),
                    });
                }
                Ok(Err(e)) => yield Err(Error::Io(e)),
                Err(_) => {
                    yield Err(Error::Timeout(format!(
                        "claude CLI did not exit within {}s",
                        timeout.as_secs()
                    )));
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fa_domain::tool::render_tool_output;
    use serde_json::json;

    fn provider_at(path: &str) -> ClaudeCliProvider {
        let settings = ProviderSettings {
            cli_path: Some(path.into()),
            ..Default::default()
        };
        ClaudeCliProvider::from_settings(&settings, Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn tier_models_carry_cli_prefix() {
        let mut settings = ProviderSettings {
            cli_path: Some("/nonexistent/claude".into()),
            ..Default::default()
        };
        settings.models.insert("complex".into(), "cli:sonnet".into());
        let p = ClaudeCliProvider::from_settings(&settings, Duration::from_secs(30)).unwrap();
        assert_eq!(p.model_for_tier(Tier::Simple), "cli:haiku");
        assert_eq!(p.model_for_tier(Tier::Moderate), "cli:sonnet");
        assert_eq!(p.model_for_tier(Tier::Complex), "cli:sonnet");
        assert_eq!(p.calculate_cost(10_000, 10_000, "cli:opus"), 0.0);
    }

    #[test]
    fn flatten_includes_every_role() {
        let calls = vec![ToolCall {
            id: "c".into(),
            name: "get_balances".into(),
            arguments: json!({}),
        }];
        let messages = vec![
            Message::user("Balance?"),
            Message::assistant_with_tool_calls("Checking", &calls),
            Message::tool_result("c", render_tool_output(&json!({"checking": 5}))),
        ];
        let prompt = flatten_messages(&messages, Some("Be brief."));
        assert_eq!(
            prompt,
            "System: Be brief.\n\n\nUser: Balance?\n\nAssistant: Checking\n\nTool Result: {\"checking\":5}"
        );
    }

    #[test]
    fn parse_output_json_and_fallback() {
        let (content, calls) = parse_cli_output(r#"{"type":"result","result":"You have $5.","session_id":"x"}"#);
        assert_eq!(content, "You have $5.");
        assert!(calls.is_empty());

        let (content, calls) = parse_cli_output(
            r#"{"result":"","tool_calls":[{"name":"get_goals","arguments":{"active":true}}]}"#,
        );
        assert_eq!(content, "");
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arguments["active"], true);

        let (content, _) = parse_cli_output("plain words\n");
        assert_eq!(content, "plain words\n");
    }

    #[tokio::test]
    async fn missing_executable_is_unavailable() {
        let p = provider_at("/nonexistent/claude");
        assert!(!p.is_available().await);
        let err = p.chat(ChatRequest::new(vec![Message::user("hi")])).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }), "{err}");
    }

    #[cfg(unix)]
    mod fake_cli {
        use super::*;
        use futures_util::StreamExt;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &tempfile::TempDir, body: &str) -> String {
            let path = dir.path().join("claude");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn with_timeout(path: &str, secs: u64) -> ClaudeCliProvider {
            let settings = ProviderSettings {
                cli_path: Some(path.into()),
                timeout_secs: Some(secs),
                ..Default::default()
            };
            ClaudeCliProvider::from_settings(&settings, Duration::from_secs(30)).unwrap()
        }

        const AUTH_OK: &str = r#"if [ "$1" = "auth" ]; then exit 0; fi"#;

        #[tokio::test]
        async fn chat_reads_json_result() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(
                &dir,
                &format!("{AUTH_OK}\necho '{{\"result\":\"Checking has $5.\"}}'"),
            );
            let p = provider_at(&path);
            assert!(p.is_available().await);

            let resp = p
                .chat(ChatRequest::new(vec![Message::user("balance?")]).with_model("cli:haiku"))
                .await
                .unwrap();
            assert_eq!(resp.content, "Checking has $5.");
            assert_eq!(resp.model, "cli:haiku");
            assert_eq!(resp.stop_reason, "end_turn");
            assert_eq!(resp.cost, 0.0);
            assert_eq!(resp.tokens_out, 4);
        }

        #[tokio::test]
        async fn auth_failure_means_unavailable() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(&dir, "exit 1");
            let p = provider_at(&path);
            assert!(!p.is_available().await);
        }

        #[tokio::test]
        async fn nonzero_exit_is_provider_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(&dir, &format!("{AUTH_OK}\necho 'not logged in' >&2\nexit 3"));
            let err = provider_at(&path)
                .chat(ChatRequest::new(vec![Message::user("hi")]))
                .await
                .unwrap_err();
            match err {
                Error::Provider { provider, message } => {
                    assert_eq!(provider, PROVIDER_NAME);
                    assert!(message.contains("not logged in"), "{message}");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn slow_cli_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(&dir, &format!("{AUTH_OK}\nsleep 5"));
            let err = with_timeout(&path, 1)
                .chat(ChatRequest::new(vec![Message::user("hi")]))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Timeout(_)), "{err}");
        }

        #[tokio::test]
        async fn stream_yields_non_empty_lines() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(&dir, &format!("{AUTH_OK}\nprintf 'one\\n\\ntwo\\n'"));
            let stream = provider_at(&path)
                .chat_stream(ChatRequest::new(vec![Message::user("hi")]))
                .await
                .unwrap();
            let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;
            assert_eq!(
                events,
                vec![
                    StreamEvent::Text { text: "one\n".into() },
                    StreamEvent::Text { text: "two\n".into() },
                    StreamEvent::Done { usage: None, stop_reason: Some("end_turn".into()) },
                ]
            );
        }

        #[tokio::test]
        async fn stream_survives_heavy_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(
                &dir,
                &format!("{AUTH_OK}\nhead -c 200000 /dev/zero | tr '\\0' x >&2\necho hello"),
            );
            let stream = with_timeout(&path, 5)
                .chat_stream(ChatRequest::new(vec![Message::user("hi")]))
                .await
                .unwrap();
            let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;
            assert_eq!(
                events,
                vec![
                    StreamEvent::Text { text: "hello\n".into() },
                    StreamEvent::Done { usage: None, stop_reason: Some("end_turn".into()) },
                ]
            );
        }

        #[tokio::test]
        async fn stream_nonzero_exit_is_error_event() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(&dir, &format!("{AUTH_OK}\necho partial\necho 'session expired' >&2\nexit 3"));
            let stream = provider_at(&path)
                .chat_stream(ChatRequest::new(vec![Message::user("hi")]))
                .await
                .unwrap();
            let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;
            assert_eq!(events.len(), 2, "{events:?}");
            assert_eq!(events[0], StreamEvent::Text { text: "partial\n".into() });
            match &events[1] {
                StreamEvent::Error { message } => {
                    assert!(message.contains("session expired"), "{message}");
                    assert!(message.contains('3'), "{message}");
                }
                other => panic!("expected error event, got {other:?}"),
            }
        }
    }
}
