//! Bounded, ordered conversation history.

use serde::{Deserialize, Serialize};

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::message::Message;

/// Default maximum number of retained messages.
pub const DEFAULT_MAX_MESSAGES: usize = 6;
/// Default number of oldest messages dropped per trim step.
pub const DEFAULT_TRIM_BATCH: usize = 2;

/// Trim policy for a [`HistoryBuffer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryPolicy {
    /// Length above which trimming kicks in.
    pub max_messages: usize,
    /// How many of the oldest messages each trim step removes.
    /// Zero is treated as one.
    pub trim_batch: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            trim_batch: DEFAULT_TRIM_BATCH,
        }
    }
}

impl HistoryPolicy {
    /// Validate policy invariants.
    ///
    /// # Errors
    /// Returns an error if either bound is zero.
    pub fn validate(&self) -> ChatResult<()> {
        if self.max_messages == 0 {
            return Err(ChatError::InvalidConfig(
                "history.max_messages must be > 0".to_string(),
            ));
        }
        if self.trim_batch == 0 {
            return Err(ChatError::InvalidConfig(
                "history.trim_batch must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordered log of messages in conversation order.
///
/// Trimming removes whole messages from the front only, so the retained
/// tail is always a contiguous suffix of what was appended.
#[derive(Clone, Debug, Default)]
pub struct HistoryBuffer {
    messages: Vec<Message>,
    policy: HistoryPolicy,
}

impl HistoryBuffer {
    /// Create an empty buffer with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with a custom policy.
    #[must_use]
    pub const fn with_policy(policy: HistoryPolicy) -> Self {
        Self {
            messages: Vec::new(),
            policy,
        }
    }

    /// Append a message, then apply the trim policy.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.trim();
    }

    /// Remove every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Owned copy of the current messages, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the buffer holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Active trim policy.
    #[must_use]
    pub const fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    fn trim(&mut self) {
        while self.messages.len() > self.policy.max_messages {
            let drop_count = self.policy.trim_batch.max(1).min(self.messages.len());
            self.messages.drain(..drop_count);
            tracing::debug!(
                dropped = drop_count,
                retained = self.messages.len(),
                "trimmed conversation history"
            );
        }
    }
}
