//! Folds streamed text fragments into one growing message.

use crate::chat::error::{ChatError, ChatResult};

/// Running text for exactly one generation.
#[derive(Clone, Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    fragments: usize,
    closed: bool,
}

impl StreamAccumulator {
    /// Create an open, empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to an open, empty state.
    pub fn start(&mut self) {
        self.text.clear();
        self.fragments = 0;
        self.closed = false;
    }

    /// Append a fragment and return the running total.
    ///
    /// # Errors
    /// Returns [`ChatError::SessionClosed`] once [`finish`](Self::finish) was called.
    pub fn feed(&mut self, fragment: &str) -> ChatResult<&str> {
        if self.closed {
            return Err(ChatError::SessionClosed);
        }
        self.text.push_str(fragment);
        self.fragments += 1;
        Ok(&self.text)
    }

    /// Close the accumulator and hand out the final text.
    pub fn finish(&mut self) -> String {
        self.closed = true;
        std::mem::take(&mut self.text)
    }

    /// Current running text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of fragments fed since the last start.
    #[must_use]
    pub const fn fragments(&self) -> usize {
        self.fragments
    }

    /// Whether [`finish`](Self::finish) has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}
