//! The assistant: one user message in, one reply out

use neural_core::backend::connect_backend;
use neural_core::config::{AssistantConfig, Config};
use neural_core::{ClearOutcome, ConfigResolver, ConversationHistory, ConversationStore};
use neural_providers::{LLMProvider, Message, OpenAICompatClient, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Reply sent when the language model cannot produce an answer
pub const APOLOGY: &str =
    "🤔 Sorry, I'm having trouble thinking right now. Please try again in a moment!";

const API_KEY_SETTING: &str = "GROQ_API_KEY";
const MODEL_SETTING: &str = "AI_MODEL";
const PREFIX_SETTING: &str = "BOT_PREFIX";

/// Errors that stop the assistant from starting
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error(transparent)]
    Core(#[from] neural_core::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Outcome of a single exchange
#[derive(Debug)]
pub struct Reply {
    /// Text to show the user
    pub text: String,
    /// Whether the text came from the model rather than the apology
    pub answered: bool,
    persist: Option<JoinHandle<()>>,
}

impl Reply {
    /// Wait for the background write of this exchange, if one was started.
    ///
    /// Short-lived processes call this before exiting so the write is not
    /// cut off when the runtime shuts down.
    pub async fn persisted(self) -> String {
        if let Some(handle) = self.persist {
            if let Err(e) = handle.await {
                warn!("Conversation persist task did not complete: {}", e);
            }
        }
        self.text
    }
}

/// Answers user messages with per-user conversational memory
pub struct Assistant {
    resolver: Arc<ConfigResolver>,
    store: Arc<ConversationStore>,
    provider: Arc<dyn LLMProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    command_prefix: String,
}

impl Assistant {
    /// Wire an assistant from already-built parts
    pub fn new(
        settings: &AssistantConfig,
        resolver: Arc<ConfigResolver>,
        store: Arc<ConversationStore>,
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            store,
            provider,
            model: model.into(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            command_prefix: settings.command_prefix.clone(),
        }
    }

    /// Build the assistant from application settings.
    ///
    /// The remote store is probed once here; if it is unusable the assistant
    /// runs on environment variables and in-memory conversations for the
    /// rest of the process.
    pub async fn bootstrap(config: &Config) -> Result<Self, AssistantError> {
        let settings = &config.assistant;

        // Bootstrap values come from the environment before any network call
        let command_prefix = ConfigResolver::new(None)
            .resolve_sync(PREFIX_SETTING, Some(settings.command_prefix.as_str()))
            .unwrap_or_else(|| settings.command_prefix.clone());

        let backend = connect_backend(&config.storage);
        let resolver = Arc::new(ConfigResolver::new(backend.clone()));

        let store = Arc::new(
            ConversationStore::new(backend, settings.persona.clone())
                .with_window(settings.history_window),
        );

        let api_key = resolver
            .resolve(API_KEY_SETTING, None)
            .await
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                neural_core::Error::Config(format!(
                    "{} not found in remote store or environment variables",
                    API_KEY_SETTING
                ))
            })?;
        let model = resolver
            .resolve(MODEL_SETTING, Some(settings.default_model.as_str()))
            .await
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| settings.default_model.clone());

        let provider = OpenAICompatClient::new(api_key, &settings.api_base, &model)?;
        info!("Assistant ready with model {}", model);

        let mut assistant = Self::new(settings, resolver, store, Arc::new(provider), model);
        assistant.command_prefix = command_prefix;
        Ok(assistant)
    }

    /// Answer `text` from `user_id`, returning the reply text
    pub async fn respond(&self, user_id: &str, text: &str) -> String {
        self.reply(user_id, text).await.text
    }

    /// Answer `text` from `user_id`.
    ///
    /// On success the exchange is appended to the user's history and
    /// persisted in the background. On any model failure the history is
    /// left untouched and the reply is [`APOLOGY`].
    pub async fn reply(&self, user_id: &str, text: &str) -> Reply {
        let history = self.store.get_or_create(user_id).await;
        let mut messages = to_messages(&history);
        messages.push(Message::user(text));

        let result = self
            .provider
            .chat(
                messages,
                Some(self.model.clone()),
                self.max_tokens,
                self.temperature,
            )
            .await;

        let answer = match result {
            Ok(response) => match response.text() {
                Some(answer) => answer.to_string(),
                None => {
                    error!("Language model returned no content for user {}", user_id);
                    return apology();
                }
            },
            Err(e) => {
                error!("Language model error for user {}: {}", user_id, e);
                return apology();
            }
        };

        let persist = self.store.append_user_and_reply(user_id, text, answer.clone());
        Reply {
            text: answer,
            answered: true,
            persist,
        }
    }

    /// Forget everything stored for `user_id`
    pub async fn clear(&self, user_id: &str) -> ClearOutcome {
        self.store.clear(user_id).await
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }
}

fn apology() -> Reply {
    Reply {
        text: APOLOGY.to_string(),
        answered: false,
        persist: None,
    }
}

fn to_messages(history: &ConversationHistory) -> Vec<Message> {
    history
        .turns()
        .iter()
        .map(|turn| Message::new(turn.role.as_str(), turn.content.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use neural_core::backend::MemoryBackend;
    use neural_core::{ConversationTurn, Table};
    use neural_providers::{LLMResponse, ProviderResult};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    const PERSONA: &str = "You are a test persona.";

    /// Provider returning canned replies and recording what it was sent
    struct MockProvider {
        reply: Option<String>,
        should_fail: bool,
        calls: Mutex<Vec<(Vec<Message>, Option<String>, u32, f32)>>,
    }

    impl MockProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                should_fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn empty() -> Self {
            Self {
                reply: None,
                should_fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                should_fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for MockProvider {
        async fn chat(
            &self,
            messages: Vec<Message>,
            model: Option<String>,
            max_tokens: u32,
            temperature: f32,
        ) -> ProviderResult<LLMResponse> {
            self.calls
                .lock()
                .push((messages, model, max_tokens, temperature));
            if self.should_fail {
                return Err(ProviderError::ApiError("HTTP 503: unavailable".to_string()));
            }
            Ok(LLMResponse {
                content: self.reply.clone(),
                finish_reason: "stop".to_string(),
                usage: HashMap::new(),
            })
        }

        fn default_model(&self) -> String {
            "mock-model".to_string()
        }
    }

    fn assistant_with(
        provider: Arc<MockProvider>,
        backend: Option<Arc<MemoryBackend>>,
    ) -> Assistant {
        let backend = backend.map(|b| b as Arc<dyn neural_core::KeyValueBackend>);
        let settings = AssistantConfig {
            persona: PERSONA.to_string(),
            ..AssistantConfig::default()
        };
        let resolver = Arc::new(ConfigResolver::new(backend.clone()).with_env_lookup(|_| None));
        let store = Arc::new(ConversationStore::new(backend, PERSONA));
        Assistant::new(&settings, resolver, store, provider, "test-model")
    }

    #[tokio::test]
    async fn test_respond_sends_history_and_records_exchange() {
        let provider = Arc::new(MockProvider::new("Hello human"));
        let assistant = assistant_with(provider.clone(), None);

        let reply = assistant.respond("u1", "hi").await;
        assert_eq!(reply, "Hello human");

        let calls = provider.calls.lock();
        let (messages, model, max_tokens, temperature) = &calls[0];
        assert_eq!(
            messages,
            &vec![Message::system(PERSONA), Message::user("hi")]
        );
        assert_eq!(model.as_deref(), Some("test-model"));
        assert_eq!(*max_tokens, 1000);
        assert!((*temperature - 0.7).abs() < f32::EPSILON);
        drop(calls);

        let history = assistant.store().cached("u1").unwrap();
        assert_eq!(
            history.turns(),
            &[
                ConversationTurn::system(PERSONA),
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("Hello human"),
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_failure_returns_apology_and_keeps_history() {
        let provider = Arc::new(MockProvider::failing());
        let backend = Arc::new(MemoryBackend::new());
        let assistant = assistant_with(provider, Some(backend.clone()));

        let reply = assistant.reply("u2", "hi").await;
        assert!(!reply.answered);
        assert_eq!(reply.persisted().await, APOLOGY);

        let history = assistant.store().cached("u2").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(backend.upsert_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_content_is_treated_as_failure() {
        let provider = Arc::new(MockProvider::empty());
        let assistant = assistant_with(provider, None);

        assert_eq!(assistant.respond("u3", "hi").await, APOLOGY);
        assert_eq!(assistant.store().cached("u3").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_persists_in_background() {
        let provider = Arc::new(MockProvider::new("stored"));
        let backend = Arc::new(MemoryBackend::new());
        let assistant = assistant_with(provider, Some(backend.clone()));

        let text = assistant.reply("u4", "remember me").await.persisted().await;
        assert_eq!(text, "stored");

        let row = backend.row(Table::Conversations, "u4").unwrap();
        assert_eq!(row["messages"].as_array().unwrap().len(), 3);
        assert_eq!(row["messages"][1]["content"], "remember me");
    }

    #[tokio::test]
    async fn test_clear_delegates_to_store() {
        let provider = Arc::new(MockProvider::new("ok"));
        let backend = Arc::new(MemoryBackend::new());
        let assistant = assistant_with(provider, Some(backend));

        assistant.reply("u5", "hi").await.persisted().await;
        let outcome = assistant.clear("u5").await;
        assert_eq!(outcome, ClearOutcome { local: true, remote: true });
        assert_eq!(assistant.clear("u5").await, ClearOutcome::default());
    }

    #[test]
    fn test_accessors() {
        let assistant = assistant_with(Arc::new(MockProvider::new("x")), None);
        assert_eq!(assistant.model(), "test-model");
        assert_eq!(assistant.command_prefix(), "!");
        assert!(!assistant.resolver().has_backend());
        assert_eq!(assistant.store().persona(), PERSONA);
    }
}
