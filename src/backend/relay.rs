//! Backend that talks to a running relay server over HTTP.

use futures::{StreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    BackendError, BackendFuture, BackendResult, ChatBackend, EventStream, ModelInfo, ModelList,
    StreamEvent,
};
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::message::{Message, Role};
use crate::config::BackendConfig;
use crate::stream::{Frame, FrameCodec, decode_stream};

#[derive(Serialize)]
struct SingleRequest<'a> {
    model: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct HistoryRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: ModelList,
}

/// Client for the relay's `/models`, `/ollama` and `/clear-history` routes.
#[derive(Clone, Debug)]
pub struct RelayBackend {
    client: Client,
    base_url: Url,
    config: BackendConfig,
    envelope: bool,
}

impl RelayBackend {
    /// Create a client for the relay at `config.base_url`.
    ///
    /// With `envelope` set the server keeps the history and only the latest
    /// user message is sent; otherwise the full history is passed through.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &BackendConfig, envelope: bool) -> ChatResult<Self> {
        let base_url = config.parsed_url()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::BackendUnavailable(BackendError::Http(e)))?;
        Ok(Self {
            client,
            base_url,
            config: config.clone(),
            envelope,
        })
    }

    /// Whether the server-side history variant is used.
    #[must_use]
    pub const fn envelope(&self) -> bool {
        self.envelope
    }

    /// Ask the server to drop its history.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn clear_history(&self) -> BackendResult<()> {
        let url = self.base_url.join("clear-history")?;
        let response = self
            .client
            .post(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn fetch_models(&self) -> BackendResult<Vec<ModelInfo>> {
        let url = self.base_url.join("models")?;
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
        let body = response.json::<ModelsResponse>().await?;
        Ok(body.models.models)
    }

    async fn post_chat(&self, model: &str, messages: &[Message]) -> BackendResult<EventStream> {
        let url = self.base_url.join("ollama")?;
        let request = if self.envelope {
            let latest = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map_or("", |m| m.content.as_str());
            self.client.post(url).json(&SingleRequest {
                model,
                message: latest,
            })
        } else {
            self.client.post(url).json(&HistoryRequest { model, messages })
        };
        debug!(model, envelope = self.envelope, "opening relay stream");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let decoder = FrameCodec {
            envelope: self.envelope,
        }
        .decoder();
        let events = decode_stream(response.bytes_stream(), decoder)
            .map(|item| match item {
                Ok(Frame::Chunk(text)) => Ok(StreamEvent::Chunk(text)),
                Ok(Frame::Done) => Ok(StreamEvent::Done),
                Ok(Frame::Error(message)) => Err(BackendError::Stream(message)),
                Err(err) => Err(BackendError::from(err)),
            });
        if self.envelope {
            return Ok(events.boxed());
        }
        // Raw bodies carry no marker; a clean end of body is completion.
        Ok(events.chain(stream::once(async { Ok(StreamEvent::Done) })).boxed())
    }
}

impl ChatBackend for RelayBackend {
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
