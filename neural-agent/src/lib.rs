//! Conversation orchestration for the Neural assistant
//!
//! Ties the settings resolver, the conversation store and a language model
//! provider together behind [`Assistant`].

pub mod assistant;

pub use assistant::{Assistant, AssistantError, Reply, APOLOGY};
pub use neural_core::ClearOutcome;
