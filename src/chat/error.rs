//! Error types for chat sessions.

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the chat subsystem.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Submit rejected before any network activity.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backend connection, listing or chat call failed.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    /// A frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Another generation is already running against this conversation.
    #[error("a generation is already in progress for this conversation")]
    SessionBusy,

    /// Text was fed to an accumulator after it was finished.
    #[error("session already closed")]
    SessionClosed,

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChatError {
    /// HTTP status used when this error reaches the server boundary.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::SessionBusy => StatusCode::CONFLICT,
            Self::BackendUnavailable(_)
            | Self::Decode(_)
            | Self::SessionClosed
            | Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same call later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SessionBusy | Self::BackendUnavailable(_))
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
