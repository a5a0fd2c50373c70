//! Language model clients for the Neural assistant
//!
//! The assistant only needs chat completions, so the crate exposes a single
//! [`LLMProvider`] trait and one OpenAI-compatible implementation.

pub mod base;
pub mod openai_compat;

pub use base::{LLMProvider, LLMResponse, Message, ProviderError, ProviderResult};
pub use openai_compat::OpenAICompatClient;
