//! Per-user conversation history
//!
//! Histories live in an in-memory cache for the lifetime of the process and
//! are written through to the remote store after every exchange.

pub mod history;
pub mod store;

pub use history::{ConversationHistory, ConversationTurn, Role};
pub use store::{ClearOutcome, ConversationStore, DEFAULT_HISTORY_WINDOW};
