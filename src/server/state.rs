//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::backend::{ChatBackend, OllamaBackend};
use crate::chat::conversation::Conversation;
use crate::chat::error::ChatResult;
use crate::chat::history::HistoryPolicy;
use crate::config::RelayConfig;

/// Shared application state.
pub struct AppState {
    /// Inference backend chats are forwarded to.
    pub backend: Arc<dyn ChatBackend>,
    /// Server-side conversation used by the single-message variant.
    pub conversation: Conversation,
}

impl AppState {
    /// Build state backed by the Ollama server in `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the client cannot be built.
    pub fn new(config: &RelayConfig) -> ChatResult<Arc<Self>> {
        config.validate()?;
        let backend = OllamaBackend::new(&config.ollama)?;
        Ok(Self::with_backend(Arc::new(backend), config.history))
    }

    /// Build state around an arbitrary backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn ChatBackend>, policy: HistoryPolicy) -> Arc<Self> {
        Arc::new(Self {
            backend,
            conversation: Conversation::new(policy),
        })
    }
}
