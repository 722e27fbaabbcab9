//! One request/response cycle against a chat backend.
//!
//! ```text
//! Idle -> Sending -> Streaming -> Finalizing -> Closed
//!            \           \
//!             +-----------+--> Errored
//! ```
//!
//! The user message is committed before the backend is contacted and stays
//! in the history whatever happens next. The assistant reply is committed
//! only on a normal end or when the transport closes early; an error or an
//! abort discards the partial text.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{ChatBackend, EventStream, StreamEvent};
use crate::chat::accumulator::StreamAccumulator;
use crate::chat::conversation::{Conversation, TurnPermit};
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::message::Message;

/// Lifecycle state of a [`GenerationSession`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Created, nothing sent yet.
    Idle,
    /// User message committed, waiting for the backend to open a stream.
    Sending,
    /// Receiving chunks.
    Streaming,
    /// Committing the assistant reply.
    Finalizing,
    /// Reply committed; the session is inert.
    Closed,
    /// Failed or aborted; nothing was committed for the reply.
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// How a committed stream ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Termination {
    /// The terminal marker arrived.
    Completed,
    /// The transport closed without a terminal marker; partial text was kept.
    Abnormal,
}

/// Progress observed after each fragment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionUpdate {
    /// Fragment just received.
    pub fragment: String,
    /// Running text including `fragment`.
    pub text: String,
}

/// Result of a completed turn.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TurnOutcome {
    /// Committed assistant content.
    pub content: String,
    /// How the stream ended.
    pub termination: Termination,
}

/// Drives one submit through to a committed (or discarded) reply.
pub struct GenerationSession {
    id: Uuid,
    conversation: Conversation,
    backend: Arc<dyn ChatBackend>,
    state: SessionState,
    accumulator: StreamAccumulator,
    events: Option<EventStream>,
    permit: Option<TurnPermit>,
    termination: Option<Termination>,
    committed: Option<String>,
}

impl fmt::Debug for GenerationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}

impl GenerationSession {
    /// Create an idle session bound to `conversation` and `backend`.
    #[must_use]
    pub fn new(conversation: Conversation, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation,
            backend,
            state: SessionState::Idle,
            accumulator: StreamAccumulator::new(),
            events: None,
            permit: None,
            termination: None,
            committed: None,
        }
    }

    /// Identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// How the stream ended, once closed.
    #[must_use]
    pub const fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Assistant content committed to the history, once closed.
    #[must_use]
    pub fn committed(&self) -> Option<&str> {
        self.committed.as_deref()
    }

    /// Running assistant text.
    #[must_use]
    pub fn text(&self) -> &str {
        self.accumulator.text()
    }

    /// The in-progress assistant message, rebuilt from the running text.
    #[must_use]
    pub fn live_message(&self) -> Option<Message> {
        (self.state == SessionState::Streaming).then(|| Message::assistant(self.accumulator.text()))
    }

    /// Validate input, commit the user message and open the backend stream.
    ///
    /// # Errors
    /// - [`ChatError::InvalidInput`] for blank text or no model; nothing is
    ///   sent and the history is untouched.
    /// - [`ChatError::SessionBusy`] while another session runs on the same
    ///   conversation.
    /// - [`ChatError::BackendUnavailable`] if the stream cannot be opened;
    ///   the user message stays committed.
    /// - [`ChatError::SessionClosed`] if this session was already used.
    pub async fn submit(&mut self, model: Option<&str>, text: &str) -> ChatResult<()> {
        if self.state != SessionState::Idle {
            return Err(ChatError::SessionClosed);
        }
        if text.trim().is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".to_string()));
        }
        let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) else {
            return Err(ChatError::InvalidInput("no model selected".to_string()));
        };

        self.permit = Some(self.conversation.try_begin_turn()?);
        self.state = SessionState::Sending;

        let snapshot = self
            .conversation
            .append_and_snapshot(Message::user(text))
            .await;
        info!(session = %self.id, model, history = snapshot.len(), "sending conversation");

        match self.backend.open_stream(model, &snapshot).await {
            Ok(events) => {
                self.events = Some(events);
                self.accumulator.start();
                self.state = SessionState::Streaming;
                Ok(())
            }
            Err(err) => {
                error!(session = %self.id, %err, "backend refused chat");
                self.fail();
                Err(ChatError::BackendUnavailable(err))
            }
        }
    }

    /// Wait for the next fragment.
    ///
    /// Returns `None` once the reply is committed (or if the session is not
    /// streaming). A backend error is returned once and leaves the session
    /// in [`SessionState::Errored`].
    pub async fn next_update(&mut self) -> Option<ChatResult<SessionUpdate>> {
        if self.state != SessionState::Streaming {
            return None;
        }
        let next = match self.events.as_mut() {
            Some(events) => events.next().await,
            None => return None,
        };

        match next {
            Some(Ok(StreamEvent::Chunk(fragment))) => match self.accumulator.feed(&fragment) {
                Ok(text) => {
                    let text = text.to_string();
                    Some(Ok(SessionUpdate { fragment, text }))
                }
                Err(err) => {
                    self.fail();
                    Some(Err(err))
                }
            },
            Some(Ok(StreamEvent::Done)) => {
                self.finalize(Termination::Completed).await;
                None
            }
            Some(Err(err)) => {
                error!(session = %self.id, %err, "stream failed, discarding partial reply");
                self.fail();
                Some(Err(ChatError::BackendUnavailable(err)))
            }
            None => {
                warn!(
                    session = %self.id,
                    chars = self.accumulator.text().len(),
                    "stream closed without terminal marker, keeping partial reply"
                );
                self.finalize(Termination::Abnormal).await;
                None
            }
        }
    }

    /// Abandon an in-flight generation without committing the reply.
    pub fn abort(&mut self) {
        if matches!(self.state, SessionState::Sending | SessionState::Streaming) {
            info!(session = %self.id, "generation aborted");
            self.fail();
        }
    }

    /// Submit and drive the whole turn, reporting each update.
    ///
    /// # Errors
    /// Returns the first error from [`submit`](Self::submit) or the stream.
    pub async fn run<F>(&mut self, model: Option<&str>, text: &str, mut on_update: F) -> ChatResult<TurnOutcome>
    where
        F: FnMut(&SessionUpdate) + Send,
    {
        self.submit(model, text).await?;
        while let Some(update) = self.next_update().await {
            on_update(&update?);
        }
        match (self.committed.clone(), self.termination) {
            (Some(content), Some(termination)) => Ok(TurnOutcome {
                content,
                termination,
            }),
            _ => Err(ChatError::SessionClosed),
        }
    }

    async fn finalize(&mut self, termination: Termination) {
        self.state = SessionState::Finalizing;
        self.events = None;
        let content = self.accumulator.finish();
        self.conversation
            .append(Message::assistant(content.clone()))
            .await;
        info!(session = %self.id, ?termination, chars = content.len(), "assistant reply committed");
        self.committed = Some(content);
        self.termination = Some(termination);
        self.state = SessionState::Closed;
        self.permit = None;
    }

    fn fail(&mut self) {
        self.state = SessionState::Errored;
        self.events = None;
        let _ = self.accumulator.finish();
        self.permit = None;
    }
}

impl Drop for GenerationSession {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Sending | SessionState::Streaming) {
            warn!(session = %self.id, state = %self.state, "session dropped mid-generation");
        }
    }
}
