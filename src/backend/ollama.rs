//! Ollama HTTP backend.
//!
//! - `GET /api/version` probes reachability.
//! - `GET /api/tags` lists installed models.
//! - `POST /api/chat` with `stream: true` answers with one JSON object per
//!   line; the last one carries `done: true`.

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{
    BackendError, BackendFuture, BackendResult, ChatBackend, EventStream, ModelInfo, ModelList,
    StreamEvent,
};
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::message::Message;
use crate::config::BackendConfig;
use crate::stream::{DelimitedBuffer, StreamDecoder, decode_stream};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<ChatLineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatLineMessage {
    #[serde(default)]
    content: String,
}

/// Async Ollama client for listing models and streaming chats.
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    client: Client,
    base_url: Url,
    config: BackendConfig,
}

impl OllamaBackend {
    /// Create a client for the configured Ollama server.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> ChatResult<Self> {
        let base_url = config.parsed_url()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::BackendUnavailable(BackendError::Http(e)))?;
        Ok(Self {
            client,
            base_url,
            config: config.clone(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check whether Ollama answers `GET /api/version`.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be built.
    pub async fn is_ready(&self) -> BackendResult<bool> {
        let url = self.base_url.join("api/version")?;
        match self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(err) => {
                debug!(%err, "ollama not reachable");
                Ok(false)
            }
        }
    }

    async fn fetch_models(&self) -> BackendResult<Vec<ModelInfo>> {
        let url = self.base_url.join("api/tags")?;
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let list = response.json::<ModelList>().await?;
        Ok(list.models)
    }

    async fn post_chat(&self, model: &str, messages: &[Message]) -> BackendResult<EventStream> {
        let url = self.base_url.join("api/chat")?;
        let request = ChatRequest {
            model,
            messages,
            stream: true,
        };
        debug!(model, messages = messages.len(), "opening ollama chat stream");

        let response = self.client.post(url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let events = decode_stream(response.bytes_stream(), NdjsonChatDecoder::default())
            .map(|item| item.map_err(BackendError::from).and_then(|event| event));
        Ok(events.boxed())
    }
}

impl ChatBackend for OllamaBackend {
    fn list_models(&self) -> BackendFuture<'_, BackendResult<Vec<ModelInfo>>> {
        Box::pin(self.fetch_models())
    }

    fn open_stream<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [Message],
    ) -> BackendFuture<'a, BackendResult<EventStream>> {
        Box::pin(self.post_chat(model, messages))
    }
}

/// Turns Ollama's newline-delimited chat objects into stream events.
#[derive(Debug)]
struct NdjsonChatDecoder {
    lines: DelimitedBuffer,
}

impl Default for NdjsonChatDecoder {
    fn default() -> Self {
        Self {
            lines: DelimitedBuffer::new(b"\n"),
        }
    }
}

impl NdjsonChatDecoder {
    fn parse_line(line: &[u8]) -> Vec<BackendResult<StreamEvent>> {
        let parsed = match serde_json::from_slice::<ChatLine>(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                if !line.iter().all(u8::is_ascii_whitespace) {
                    warn!(%err, "skipping malformed ollama line");
                }
                return Vec::new();
            }
        };

        if let Some(error) = parsed.error {
            return vec![Err(BackendError::Stream(error))];
        }

        let mut events = Vec::new();
        if let Some(message) = parsed.message {
            if !message.content.is_empty() {
                events.push(Ok(StreamEvent::Chunk(message.content)));
            }
        }
        if parsed.done {
            events.push(Ok(StreamEvent::Done));
        }
        events
    }
}

impl StreamDecoder for NdjsonChatDecoder {
    type Item = BackendResult<StreamEvent>;

    fn decode(&mut self, bytes: &[u8]) -> Vec<Self::Item> {
        self.lines
            .push(bytes)
            .iter()
            .flat_map(|line| Self::parse_line(line))
            .collect()
    }

    fn finish(&mut self) -> Vec<Self::Item> {
        self.lines
            .take_remainder()
            .map(|line| Self::parse_line(&line))
            .unwrap_or_default()
    }
}
