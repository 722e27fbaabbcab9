//! Chat client for a running relay server.
//!
//! Keeps a local transcript (trimmed like the server's), tracks the selected
//! model and streams replies through a [`GenerationSession`].

use std::sync::Arc;

use tracing::info;

use crate::backend::{ChatBackend, RelayBackend};
use crate::chat::conversation::Conversation;
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::message::Message;
use crate::chat::session::{GenerationSession, SessionUpdate, TurnOutcome};
use crate::config::ClientConfig;

/// Interactive client state.
#[derive(Debug)]
pub struct ChatClient {
    backend: Arc<RelayBackend>,
    conversation: Conversation,
    model: Option<String>,
}

impl ChatClient {
    /// Create a client for the relay described by `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn connect(config: &ClientConfig) -> ChatResult<Self> {
        config.validate()?;
        let backend = RelayBackend::new(&config.server, config.envelope)?;
        Ok(Self {
            backend: Arc::new(backend),
            conversation: Conversation::new(config.history),
            model: None,
        })
    }

    /// Names of the models the server offers.
    ///
    /// # Errors
    /// Returns an error if the server cannot list models.
    pub async fn list_models(&self) -> ChatResult<Vec<String>> {
        let models = self.backend.list_models().await?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }

    /// Select the first advertised model, if any.
    ///
    /// # Errors
    /// Returns an error if the server cannot list models.
    pub async fn select_first_model(&mut self) -> ChatResult<Option<&str>> {
        let first = self.list_models().await?.into_iter().next();
        if let Some(name) = &first {
            info!(model = %name, "model selected");
        }
        self.model = first;
        Ok(self.model.as_deref())
    }

    /// Select a model by name.
    ///
    /// # Errors
    /// Returns [`ChatError::InvalidInput`] for a blank name.
    pub fn select_model(&mut self, name: &str) -> ChatResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::InvalidInput("model name must not be empty".to_string()));
        }
        info!(model = name, "model selected");
        self.model = Some(name.to_string());
        Ok(())
    }

    /// Currently selected model.
    #[must_use]
    pub fn selected_model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Send one user message and stream the reply into `on_update`.
    ///
    /// # Errors
    /// See [`GenerationSession::submit`]; stream failures surface as
    /// [`ChatError::BackendUnavailable`].
    pub async fn send<F>(&self, text: &str, on_update: F) -> ChatResult<TurnOutcome>
    where
        F: FnMut(&SessionUpdate) + Send,
    {
        let backend: Arc<dyn ChatBackend> = self.backend.clone();
        let mut session = GenerationSession::new(self.conversation.clone(), backend);
        session.run(self.model.as_deref(), text, on_update).await
    }

    /// Clear the server history, then the local transcript.
    ///
    /// # Errors
    /// Returns an error if the server refuses; the local transcript is kept.
    pub async fn clear(&self) -> ChatResult<()> {
        self.backend.clear_history().await?;
        self.conversation.clear().await;
        info!("history cleared");
        Ok(())
    }

    /// Local transcript, oldest first.
    pub async fn transcript(&self) -> Vec<Message> {
        self.conversation.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use crate::backend::{ScriptStep, ScriptedBackend};
    use crate::chat::history::HistoryPolicy;
    use crate::chat::session::Termination;
    use crate::server::{self, AppState};

    struct Harness {
        state: Arc<AppState>,
        url: String,
        _stop: oneshot::Sender<()>,
    }

    async fn spawn_relay(backend: ScriptedBackend) -> Harness {
        let state = AppState::with_backend(Arc::new(backend), HistoryPolicy::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let (stop, stopped) = oneshot::channel::<()>();
        let shutdown = async move {
            let _ = stopped.await;
        };
        let _server = tokio::spawn(server::serve(listener, Arc::clone(&state), shutdown));
        Harness {
            state,
            url,
            _stop: stop,
        }
    }

    fn client(harness: &Harness, envelope: bool) -> ChatClient {
        let config = ClientConfig::default()
            .with_server_url(harness.url.clone())
            .with_envelope(envelope);
        ChatClient::connect(&config).unwrap()
    }

    #[tokio::test]
    async fn test_envelope_turn_end_to_end() {
        let backend = ScriptedBackend::replying(&["Hi", " there", "!"]).with_models(&["X", "Y"]);
        let harness = spawn_relay(backend).await;
        let mut chat = client(&harness, true);

        assert_eq!(chat.select_first_model().await.unwrap(), Some("X"));

        let mut seen = Vec::new();
        let outcome = chat
            .send("Hello", |update| seen.push(update.text.clone()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["Hi", "Hi there", "Hi there!"]);
        assert_eq!(outcome.content, "Hi there!");
        assert_eq!(outcome.termination, Termination::Completed);
        let expected = vec![Message::user("Hello"), Message::assistant("Hi there!")];
        assert_eq!(chat.transcript().await, expected);
        assert_eq!(harness.state.conversation.snapshot().await, expected);
    }

    #[tokio::test]
    async fn test_raw_turn_end_to_end() {
        let backend = ScriptedBackend::replying(&["raw ", "reply"]);
        let harness = spawn_relay(backend.clone()).await;
        let mut chat = client(&harness, false);
        chat.select_model("X").unwrap();

        let outcome = chat.send("Hello", |_| {}).await.unwrap();
        assert_eq!(outcome.content, "raw reply");
        assert_eq!(outcome.termination, Termination::Completed);
        assert!(harness.state.conversation.is_empty().await);

        chat.send("Again", |_| {}).await.unwrap();
        let requests = backend.requests().await;
        assert_eq!(requests[1].1.len(), 3);
        assert_eq!(chat.transcript().await.len(), 4);
    }

    #[tokio::test]
    async fn test_raw_reply_with_envelope_like_text() {
        let backend = ScriptedBackend::replying(&[":) sure", ", here it is"]);
        let harness = spawn_relay(backend).await;
        let mut chat = client(&harness, false);
        chat.select_model("X").unwrap();

        let outcome = chat.send("Hello", |_| {}).await.unwrap();
        assert_eq!(outcome.content, ":) sure, here it is");
        assert_eq!(outcome.termination, Termination::Completed);

        let backend = ScriptedBackend::replying(&["data: not a frame"]);
        let harness = spawn_relay(backend).await;
        let mut chat = client(&harness, false);
        chat.select_model("X").unwrap();

        let outcome = chat.send("Hello", |_| {}).await.unwrap();
        assert_eq!(outcome.content, "data: not a frame");
    }

    #[tokio::test]
    async fn test_abnormal_close_keeps_partial() {
        let backend = ScriptedBackend::new(vec![ScriptStep::chunk("partial")]);
        let harness = spawn_relay(backend).await;
        let mut chat = client(&harness, true);
        chat.select_model("X").unwrap();

        let outcome = chat.send("Hello", |_| {}).await.unwrap();
        assert_eq!(outcome.content, "partial");
        assert_eq!(outcome.termination, Termination::Abnormal);
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let backend = ScriptedBackend::replying(&["x"]).failing_with(503);
        let harness = spawn_relay(backend).await;
        let mut chat = client(&harness, true);
        chat.select_model("X").unwrap();

        let err = chat.send("Hello", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::BackendUnavailable(_)));
        assert_eq!(chat.transcript().await, vec![Message::user("Hello")]);
        assert!(chat.list_models().await.is_err());
    }

    #[tokio::test]
    async fn test_clear_resets_both_sides() {
        let backend = ScriptedBackend::replying(&["ok"]);
        let harness = spawn_relay(backend).await;
        let mut chat = client(&harness, true);
        chat.select_model("X").unwrap();
        chat.send("Hello", |_| {}).await.unwrap();

        chat.clear().await.unwrap();
        assert!(chat.transcript().await.is_empty());
        assert!(harness.state.conversation.is_empty().await);
    }

    #[tokio::test]
    async fn test_no_model_is_invalid_input() {
        let harness = spawn_relay(ScriptedBackend::replying(&["x"])).await;
        let chat = client(&harness, true);
        let err = chat.send("Hello", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        assert!(chat.transcript().await.is_empty());
    }

    #[test]
    fn test_blank_model_name_rejected() {
        let mut chat = ChatClient::connect(&ClientConfig::default()).unwrap();
        assert!(chat.select_model("   ").is_err());
        assert_eq!(chat.selected_model(), None);
    }
}
