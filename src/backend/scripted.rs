//! In-memory backend replaying a fixed script.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use super::{
    BackendError, BackendFuture, BackendResult, ChatBackend, EventStream, ModelInfo, StreamEvent,
};
use crate::chat::message::Message;

/// One scripted stream event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptStep {
    /// Emit a text fragment.
    Chunk(String),
    /// Emit the terminal marker.
    Done,
    /// Fail the stream with this message.
    Fail(String),
}

impl ScriptStep {
    /// Build a chunk step.
    #[must_use]
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk(text.into())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    requests: Vec<(String, Vec<Message>)>,
}

/// Backend that answers every chat with the same scripted events.
///
/// Handy for running the relay without a GPU and for tests. Every request
/// is recorded so callers can inspect what was sent.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    models: Vec<ModelInfo>,
    script: Vec<ScriptStep>,
    open_status: Option<u16>,
    recorded: Arc<Mutex<Recorded>>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    /// Backend answering with `script` on every chat.
    #[must_use]
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Backend streaming `fragments` followed by the terminal marker.
    #[must_use]
    pub fn replying(fragments: &[&str]) -> Self {
        let mut script: Vec<ScriptStep> = fragments.iter().map(|f| ScriptStep::chunk(*f)).collect();
        script.push(ScriptStep::Done);
        Self::new(script)
    }

    /// Advertise these model names.
    #[must_use]
    pub fn with_models(mut self, names: &[&str]) -> Self {
        self.models = names
            .iter()
            .map(|name| ModelInfo {
                name: (*name).to_string(),
                model: (*name).to_string(),
                ..ModelInfo::default()
            })
            .collect();
        self
    }

    /// Refuse every chat and listing with this HTTP status.
    #[must_use]
    pub const fn failing_with(mut self, status: u16) -> Self {
        self.open_status = Some(status);
        self
    }

    /// Number of chat streams requested so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Model and messages of every chat request, oldest first.
    pub async fn requests(&self) -> Vec<(String, Vec<Message>)> {
        self.recorded.lock().await.requests.clone()
    }
}

impl ChatBackend for ScriptedBackend {
    fn list_models(&self) -> BackendFuture<'_, BackendResult<Vec<ModelInfo>>> {
        Box::pin(async move {
            match self.open_status {
                Some(status) => Err(BackendError::Status(status)),
                None => Ok(self.models.clone()),
            }
        })
    }

    fn open_stream<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [Message],
    ) -> BackendFuture<'a, BackendResult<EventStream>> {
        Box::pin(async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.recorded
                .lock()
                .await
                .requests
                .push((model.to_string(), messages.to_vec()));

            if let Some(status) = self.open_status {
                return Err(BackendError::Status(status));
            }

            let events: Vec<BackendResult<StreamEvent>> = self
                .script
                .iter()
                .map(|step| match step {
                    ScriptStep::Chunk(text) => Ok(StreamEvent::Chunk(text.clone())),
                    ScriptStep::Done => Ok(StreamEvent::Done),
                    ScriptStep::Fail(message) => Err(BackendError::Stream(message.clone())),
                })
                .collect();
            Ok(stream::iter(events).boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_script_and_records() {
        let backend = ScriptedBackend::replying(&["a", "b"]).with_models(&["m1"]);
        let messages = vec![Message::user("hi")];
        let stream = backend.open_stream("m1", &messages).await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(backend.calls(), 1);
        assert_eq!(backend.requests().await, vec![("m1".to_string(), messages)]);
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let backend = ScriptedBackend::replying(&["a"]).failing_with(503);
        assert!(matches!(
            backend.list_models().await,
            Err(BackendError::Status(503))
        ));
        assert!(backend.open_stream("m", &[]).await.is_err());
        assert_eq!(backend.calls(), 1);
    }
}
