//! Shared utility functions for provider adapters.

use fa_domain::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Turn a non-2xx response into [`Error::Provider`] carrying the body text.
pub(crate) async fn ensure_success(
    provider: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.map_err(from_reqwest)?;
    Err(Error::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {} - {}", status.as_u16(), body),
    })
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Read `VAR=value` from a line-oriented key file. Missing or unreadable
/// files yield `None`.
pub fn read_key_file(path: &Path, var: &str) -> Option<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "key file not readable");
            return None;
        }
    };
    let prefix = format!("{var}=");
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve an API key.
///
/// Precedence:
/// 1. `api_key_file` (the `VAR=` line)
/// 2. environment variable `VAR`
///
/// A missing key is not an error here; the provider reports itself
/// unavailable instead.
pub fn resolve_api_key(api_key_file: Option<&str>, var: &str) -> Option<String> {
    if let Some(file) = api_key_file {
        let path = expand_home(file);
        if let Some(key) = read_key_file(&path, var) {
            tracing::debug!(env_var = %var, path = %path.display(), "API key loaded from key file");
            return Some(key);
        }
    }
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Look up an executable on `PATH`.
pub(crate) fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}
