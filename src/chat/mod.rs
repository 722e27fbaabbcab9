//! Conversation state and the generation state machine.

pub mod accumulator;
pub mod conversation;
pub mod error;
pub mod history;
pub mod message;
pub mod session;

pub use accumulator::StreamAccumulator;
pub use conversation::{Conversation, TurnPermit};
pub use error::{ChatError, ChatResult};
pub use history::{HistoryBuffer, HistoryPolicy};
pub use message::{Message, Role};
pub use session::{
    GenerationSession, SessionState, SessionUpdate, Termination, TurnOutcome,
};
