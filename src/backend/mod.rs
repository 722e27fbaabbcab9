//! Inference backends the relay can stream from.
//!
//! - [`OllamaBackend`] talks to a local Ollama server.
//! - [`RelayBackend`] talks to this crate's own `/ollama` endpoint.
//! - [`ScriptedBackend`] replays a fixed script, for offline use and tests.

pub mod error;
pub mod ollama;
pub mod relay;
pub mod scripted;

pub use error::{BackendError, BackendResult};
pub use ollama::OllamaBackend;
pub use relay::RelayBackend;
pub use scripted::{ScriptStep, ScriptedBackend};

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, FixedOffset};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::chat::message::Message;

/// Boxed future type for backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stream of events for one generation.
pub type EventStream = BoxStream<'static, BackendResult<StreamEvent>>;

/// One event of a streamed generation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StreamEvent {
    /// Opaque text fragment to append verbatim.
    Chunk(String),
    /// The backend finished normally; nothing else follows.
    Done,
}

/// Trait abstraction over chat-capable inference servers.
pub trait ChatBackend: Send + Sync {
    /// List installed models.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be reached or answers badly.
    fn list_models(&self) -> BackendFuture<'_, BackendResult<Vec<ModelInfo>>>;

    /// Send `messages` to `model` and open the response stream.
    ///
    /// # Errors
    /// Returns an error if the request is refused or the stream cannot open.
    fn open_stream<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [Message],
    ) -> BackendFuture<'a, BackendResult<EventStream>>;
}

/// Installed model as reported by Ollama.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Display name, e.g. `llama3:8b`.
    pub name: String,
    /// Model identifier.
    #[serde(default)]
    pub model: String,
    /// Last modification time.
    #[serde(default)]
    pub modified_at: Option<DateTime<FixedOffset>>,
    /// Size on disk in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content digest.
    #[serde(default)]
    pub digest: String,
    /// Format and family details.
    #[serde(default)]
    pub details: ModelDetails,
}

/// Format and family details of a model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDetails {
    /// Parent model, if derived.
    #[serde(default)]
    pub parent_model: String,
    /// Weights format, e.g. `gguf`.
    #[serde(default)]
    pub format: String,
    /// Primary family.
    #[serde(default)]
    pub family: String,
    /// All families.
    #[serde(default)]
    pub families: Option<Vec<String>>,
    /// Parameter count label, e.g. `8B`.
    #[serde(default)]
    pub parameter_size: String,
    /// Quantization label, e.g. `Q4_0`.
    #[serde(default)]
    pub quantization_level: String,
}

/// Listing envelope used by Ollama `/api/tags` and by `/models`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    /// Installed models.
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ollama_tags() {
        let body = r#"{"models":[{
            "name":"llama3:8b","model":"llama3:8b",
            "modified_at":"2024-05-01T10:00:00.123456789-07:00",
            "size":4661224676,"digest":"abc",
            "details":{"parent_model":"","format":"gguf","family":"llama",
                       "families":["llama"],"parameter_size":"8.0B","quantization_level":"Q4_0"}
        },{"name":"bare"}]}"#;
        let list: ModelList = serde_json::from_str(body).unwrap_or_default();
        assert_eq!(list.models.len(), 2);
        assert_eq!(list.models[0].details.family, "llama");
        assert!(list.models[0].modified_at.is_some());
        assert_eq!(list.models[1].name, "bare");
        assert_eq!(list.models[1].size, 0);
    }
}
