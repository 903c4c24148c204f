/// Shared error type used across all finai crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// `chat()` was invoked on a provider that is not configured or reachable.
    #[error("provider {provider} is not available: {reason}")]
    Unavailable { provider: String, reason: String },

    /// Routing found no registered provider that is available.
    #[error("{0}")]
    NoProviderAvailable(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
