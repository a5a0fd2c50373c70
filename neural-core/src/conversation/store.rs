//! Conversation store: in-memory cache over the remote store

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::history::{ConversationHistory, ConversationTurn};
use crate::backend::{KeyValueBackend, Table};

/// Non-system turns kept per conversation
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Which tiers had data removed by [`ConversationStore::clear`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearOutcome {
    /// An in-memory history was dropped
    pub local: bool,
    /// A remote row was deleted
    pub remote: bool,
}

impl ClearOutcome {
    pub fn any(&self) -> bool {
        self.local || self.remote
    }

    /// User-facing feedback listing the tiers that were cleared
    pub fn summary(&self) -> String {
        if !self.any() {
            return "🤷 You don't have any conversation history to clear!".to_string();
        }

        let mut lines = vec!["✅ Your conversation history has been cleared! 🧹".to_string()];
        if self.local {
            lines.push("• Local cache cleared".to_string());
        }
        if self.remote {
            lines.push("• Remote records cleared".to_string());
        }
        lines.join("\n")
    }
}

/// Manages per-user conversation histories
pub struct ConversationStore {
    backend: Option<Arc<dyn KeyValueBackend>>,
    /// The lock is only held between suspension points
    cache: Mutex<HashMap<String, ConversationHistory>>,
    persona: String,
    window: usize,
}

impl ConversationStore {
    /// Create a store. `None` keeps conversations in memory only.
    pub fn new(backend: Option<Arc<dyn KeyValueBackend>>, persona: impl Into<String>) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            persona: persona.into(),
            window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Override the number of non-system turns kept
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Get a user's history, loading or creating it on a cache miss.
    ///
    /// There is no single-flight guard: two calls racing on the same miss
    /// both load, and the one finishing last replaces the cache entry.
    pub async fn get_or_create(&self, user_id: &str) -> ConversationHistory {
        if let Some(history) = self.cached(user_id) {
            return history;
        }

        let loaded = self.load(user_id).await;
        let history = if loaded.is_empty() {
            debug!("Starting new conversation for user {}", user_id);
            ConversationHistory::new(self.persona.clone())
        } else {
            info!("Loaded conversation history for user {} from remote store", user_id);
            ConversationHistory::from_turns(loaded)
        };

        self.cache.lock().insert(user_id.to_string(), history.clone());
        history
    }

    /// Peek at the cached history without touching the remote store
    pub fn cached(&self, user_id: &str) -> Option<ConversationHistory> {
        self.cache.lock().get(user_id).cloned()
    }

    /// Record a user message and the assistant's reply.
    ///
    /// Applies the retention window, then persists the whole history in a
    /// detached task. The returned handle may be dropped; persist failures
    /// are logged and never reach the caller. `None` means there is no
    /// remote store to persist to.
    ///
    /// Must be called from within a tokio runtime.
    pub fn append_user_and_reply(
        &self,
        user_id: &str,
        user_text: impl Into<String>,
        reply_text: impl Into<String>,
    ) -> Option<JoinHandle<()>> {
        let snapshot = {
            let mut cache = self.cache.lock();
            // A concurrent clear may have dropped the entry since it was loaded
            let history = cache
                .entry(user_id.to_string())
                .or_insert_with(|| ConversationHistory::new(self.persona.clone()));
            history.push(ConversationTurn::user(user_text));
            history.push(ConversationTurn::assistant(reply_text));
            let dropped = history.apply_retention(self.window);
            if dropped > 0 {
                debug!("Dropped {} old turns for user {}", dropped, user_id);
            }
            history.clone()
        };

        let backend = self.backend.clone()?;
        let user_id = user_id.to_string();
        Some(tokio::spawn(async move {
            save(backend.as_ref(), &user_id, &snapshot).await;
        }))
    }

    /// Remove a user's history from both tiers.
    ///
    /// A persist spawned by an earlier append may still be in flight. If it
    /// lands after the remote delete, the row reappears and is loaded again
    /// after a restart; the in-memory entry stays cleared.
    pub async fn clear(&self, user_id: &str) -> ClearOutcome {
        let local = self.cache.lock().remove(user_id).is_some();

        let remote = match &self.backend {
            Some(backend) => match backend.delete(Table::Conversations, user_id).await {
                Ok(removed) => {
                    info!("Cleared remote conversation for user {} (removed: {})", user_id, removed);
                    removed
                }
                Err(e) => {
                    error!("Error clearing conversation for user {}: {}", user_id, e);
                    false
                }
            },
            None => false,
        };

        ClearOutcome { local, remote }
    }

    async fn load(&self, user_id: &str) -> Vec<ConversationTurn> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };

        let row = match backend.get(Table::Conversations, user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                info!("No conversation history found for user {}", user_id);
                return Vec::new();
            }
            Err(e) => {
                error!("Error retrieving conversation for user {}: {}", user_id, e);
                return Vec::new();
            }
        };

        let messages = row.get("messages").cloned().unwrap_or(serde_json::Value::Null);
        match serde_json::from_value::<Vec<ConversationTurn>>(messages) {
            Ok(turns) => {
                info!("Retrieved {} messages for user {}", turns.len(), user_id);
                turns
            }
            Err(e) => {
                error!("Malformed conversation stored for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }
}

async fn save(backend: &dyn KeyValueBackend, user_id: &str, history: &ConversationHistory) -> bool {
    let record = json!({
        "user_id": user_id,
        "messages": history,
        "updated_at": Utc::now().to_rfc3339(),
    });

    match backend.upsert(Table::Conversations, record).await {
        Ok(()) => {
            info!(
                "Successfully saved conversation for user {} ({} messages)",
                user_id,
                history.len()
            );
            true
        }
        Err(e) => {
            error!("Error saving conversation for user {}: {}", user_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, MemoryBackend};
    use crate::conversation::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PERSONA: &str = "You are a test persona.";

    fn store_with(backend: &Arc<MemoryBackend>) -> ConversationStore {
        ConversationStore::new(Some(backend.clone() as Arc<dyn KeyValueBackend>), PERSONA)
    }

    fn seed_history(backend: &MemoryBackend, user_id: &str, turns: serde_json::Value) {
        backend
            .seed(
                Table::Conversations,
                json!({"user_id": user_id, "messages": turns, "updated_at": "2024-01-01T00:00:00Z"}),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_new_user_gets_persona() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend);

        let history = store.get_or_create("1").await;
        assert_eq!(history.turns(), &[ConversationTurn::system(PERSONA)]);
        assert_eq!(backend.get_count(), 1);

        store.get_or_create("1").await;
        assert_eq!(backend.get_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_history_is_adopted_verbatim() {
        let backend = Arc::new(MemoryBackend::new());
        seed_history(
            &backend,
            "2",
            json!([
                {"role": "system", "content": "old persona"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]),
        );
        let store = store_with(&backend);

        let history = store.get_or_create("2").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history.turns()[0].content, "old persona");
        assert_eq!(history.turns()[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_empty_or_broken_remote_history_starts_fresh() {
        let backend = Arc::new(MemoryBackend::new());
        seed_history(&backend, "empty", json!([]));
        seed_history(&backend, "broken", json!({"not": "a list"}));
        let store = store_with(&backend);

        assert_eq!(store.get_or_create("empty").await.len(), 1);
        assert_eq!(store.get_or_create("broken").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_starts_fresh() {
        let backend = Arc::new(MemoryBackend::new());
        seed_history(&backend, "3", json!([{"role": "system", "content": "x"}, {"role": "user", "content": "y"}]));
        backend.set_unavailable(true);
        let store = store_with(&backend);

        let history = store.get_or_create("3").await;
        assert_eq!(history.turns(), &[ConversationTurn::system(PERSONA)]);
    }

    #[tokio::test]
    async fn test_append_persists_post_retention_history() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend).with_window(4);
        store.get_or_create("4").await;

        for i in 0..3 {
            let handle = store
                .append_user_and_reply("4", format!("q{i}"), format!("a{i}"))
                .unwrap();
            handle.await.unwrap();
        }

        let cached = store.cached("4").unwrap();
        assert_eq!(cached.len(), 5);
        assert_eq!(cached.turns()[1], ConversationTurn::user("q1"));

        let row = backend.row(Table::Conversations, "4").unwrap();
        let stored: Vec<ConversationTurn> = serde_json::from_value(row["messages"].clone()).unwrap();
        assert_eq!(stored, cached.into_turns());
        assert!(row["updated_at"].is_string());
        assert_eq!(backend.upsert_count(), 3);
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_memory_intact() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend);
        store.get_or_create("5").await;
        backend.set_unavailable(true);

        store
            .append_user_and_reply("5", "question", "answer")
            .unwrap()
            .await
            .unwrap();

        assert_eq!(store.cached("5").unwrap().len(), 3);
        assert!(backend.row(Table::Conversations, "5").is_none());
    }

    #[tokio::test]
    async fn test_append_without_backend_stays_local() {
        let store = ConversationStore::new(None, PERSONA);
        store.get_or_create("6").await;

        assert!(store.append_user_and_reply("6", "q", "a").is_none());
        assert_eq!(store.cached("6").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_append_after_clear_reinitializes() {
        let store = ConversationStore::new(None, PERSONA);
        store.get_or_create("7").await;
        store.clear("7").await;

        store.append_user_and_reply("7", "q", "a");
        let history = store.cached("7").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.turns()[0], ConversationTurn::system(PERSONA));
    }

    #[tokio::test]
    async fn test_clear_reports_tiers() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend);

        assert_eq!(store.clear("nobody").await, ClearOutcome::default());

        seed_history(&backend, "remote-only", json!([{"role": "system", "content": "p"}]));
        assert_eq!(
            store.clear("remote-only").await,
            ClearOutcome { local: false, remote: true }
        );

        store.get_or_create("both").await;
        store.append_user_and_reply("both", "q", "a").unwrap().await.unwrap();
        assert_eq!(
            store.clear("both").await,
            ClearOutcome { local: true, remote: true }
        );
        assert!(store.cached("both").is_none());
    }

    #[tokio::test]
    async fn test_clear_with_failing_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend);
        store.get_or_create("8").await;
        backend.set_unavailable(true);

        let outcome = store.clear("8").await;
        assert_eq!(outcome, ClearOutcome { local: true, remote: false });
        assert!(outcome.any());
    }

    #[test]
    fn test_clear_summary_lists_tiers() {
        let nothing = ClearOutcome::default().summary();
        assert!(nothing.contains("don't have any conversation history"));

        let remote_only = ClearOutcome { local: false, remote: true }.summary();
        assert!(remote_only.contains("Remote records cleared"));
        assert!(!remote_only.contains("Local cache cleared"));

        let both = ClearOutcome { local: true, remote: true }.summary();
        assert!(both.contains("Local cache cleared"));
        assert!(both.contains("Remote records cleared"));
    }

    /// Serves canned rows in call order; each later call takes longer to answer
    struct StaggeredBackend {
        rows: Vec<serde_json::Value>,
        gets: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueBackend for StaggeredBackend {
        async fn get(&self, _table: Table, _key: &str) -> BackendResult<Option<serde_json::Value>> {
            let call = self.gets.fetch_add(1, Ordering::SeqCst);
            for _ in 0..=call {
                tokio::task::yield_now().await;
            }
            Ok(self.rows.get(call).cloned())
        }

        async fn upsert(&self, _table: Table, _record: serde_json::Value) -> BackendResult<()> {
            Ok(())
        }

        async fn delete(&self, _table: Table, _key: &str) -> BackendResult<bool> {
            Ok(false)
        }
    }

    fn stored(user_text: &str) -> serde_json::Value {
        json!({
            "user_id": "racer",
            "messages": [
                {"role": "system", "content": PERSONA},
                {"role": "user", "content": user_text}
            ]
        })
    }

    #[tokio::test]
    async fn test_concurrent_misses_both_load_and_last_finisher_wins() {
        let backend = Arc::new(StaggeredBackend {
            rows: vec![stored("first"), stored("second")],
            gets: AtomicUsize::new(0),
        });
        let store = ConversationStore::new(Some(backend.clone() as Arc<dyn KeyValueBackend>), PERSONA);

        let (early, late) = tokio::join!(store.get_or_create("racer"), store.get_or_create("racer"));

        assert_eq!(backend.gets.load(Ordering::SeqCst), 2);
        assert_eq!(early.turns()[1], ConversationTurn::user("first"));
        assert_eq!(late.turns()[1], ConversationTurn::user("second"));
        assert_eq!(store.cached("racer").unwrap(), late);
    }

    #[tokio::test]
    async fn test_in_flight_persist_can_restore_cleared_row() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(&backend);

        store.get_or_create("late").await;
        store.append_user_and_reply("late", "q1", "a1").unwrap().await.unwrap();
        let pending = store.append_user_and_reply("late", "q2", "a2").unwrap();

        assert_eq!(
            store.clear("late").await,
            ClearOutcome { local: true, remote: true }
        );
        pending.await.unwrap();

        assert!(store.cached("late").is_none());
        let row = backend.row(Table::Conversations, "late").unwrap();
        assert_eq!(row["messages"].as_array().unwrap().len(), 5);
    }
}
