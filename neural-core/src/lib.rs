//! Core types and services for the Neural assistant
//!
//! This crate owns the only stateful parts of the assistant: resolving
//! settings through a remote store with local-environment fallback, and
//! keeping per-user conversation history in a cache backed by that store.

pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;

#[cfg(test)]
mod test_support;

pub use backend::{BackendError, KeyValueBackend, Table};
pub use config::{Config, ConfigLoader, ConfigResolver};
pub use conversation::{ClearOutcome, ConversationHistory, ConversationStore, ConversationTurn, Role};
pub use error::{Error, Result};
