//! Shared handle to one conversation history.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::history::{HistoryBuffer, HistoryPolicy};
use crate::chat::message::Message;

/// Exclusive right to run one generation against a [`Conversation`].
///
/// Released when dropped.
#[derive(Debug)]
pub struct TurnPermit {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug)]
struct Inner {
    history: Mutex<HistoryBuffer>,
    turn: Arc<Mutex<()>>,
}

/// Cheaply cloneable handle owning a [`HistoryBuffer`].
///
/// Every mutation goes through the inner mutex, so append plus trim and
/// clear are each observed as one step.
#[derive(Clone, Debug)]
pub struct Conversation {
    inner: Arc<Inner>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(HistoryPolicy::default())
    }
}

impl Conversation {
    /// Create an empty conversation with the given trim policy.
    #[must_use]
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                history: Mutex::new(HistoryBuffer::with_policy(policy)),
                turn: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Append a message and apply the trim policy.
    pub async fn append(&self, message: Message) {
        self.inner.history.lock().await.append(message);
    }

    /// Append a message and return the resulting snapshot in one step.
    pub async fn append_and_snapshot(&self, message: Message) -> Vec<Message> {
        let mut history = self.inner.history.lock().await;
        history.append(message);
        history.snapshot()
    }

    /// Remove every message.
    pub async fn clear(&self) {
        self.inner.history.lock().await.clear();
    }

    /// Owned copy of the history, oldest first.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.history.lock().await.snapshot()
    }

    /// Number of retained messages.
    pub async fn len(&self) -> usize {
        self.inner.history.lock().await.len()
    }

    /// Whether the history is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.history.lock().await.is_empty()
    }

    /// Claim the turn lock without waiting.
    ///
    /// # Errors
    /// Returns [`ChatError::SessionBusy`] while another generation holds it.
    pub fn try_begin_turn(&self) -> ChatResult<TurnPermit> {
        Arc::clone(&self.inner.turn)
            .try_lock_owned()
            .map(|guard| TurnPermit { _guard: guard })
            .map_err(|_| ChatError::SessionBusy)
    }

    /// Whether a generation currently holds the turn lock.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.turn.try_lock().is_err()
    }
}
