//! Error types for inference backends.

use thiserror::Error;

/// Errors produced while talking to a chat backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request or body transfer failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("backend http status not ok: {0}")]
    Status(u16),

    /// Backend reported a failure inside the stream.
    #[error("backend stream error: {0}")]
    Stream(String),

    /// Configured base URL is not valid.
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response body could not be parsed.
    #[error("json parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Whether the backend could not be reached at all.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        match self {
            Self::Http(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}

/// Convenience result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
