//! Settings resolution: remote store first, process environment second
//!
//! Resolved values are cached for the lifetime of the resolver. Only an
//! explicit [`ConfigResolver::set`] or [`ConfigResolver::clear_cache`] changes
//! what a cached key resolves to. Misses are never cached, so a transient
//! remote failure is retried on the next call for the same key.

use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::{KeyValueBackend, Table};

/// Environment lookup used as the local fallback tier
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Outcome of asking the remote store for a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLookup {
    /// No remote store is configured
    Disabled,
    /// The store holds a value for the key
    Found(String),
    /// The store answered but has no row for the key
    Missing,
    /// The store could not be reached or answered with an error
    Failed(String),
}

/// Where a resolved value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Cached(String),
    Remote(String),
    Environment(String),
    Default(Option<String>),
}

impl Resolution {
    /// Whether the value should be remembered for later calls
    pub fn is_cacheable(&self) -> bool {
        match self {
            Resolution::Remote(_) => true,
            Resolution::Environment(value) => !value.is_empty(),
            Resolution::Cached(_) | Resolution::Default(_) => false,
        }
    }

    /// Short label of the tier that produced the value
    pub fn source(&self) -> &'static str {
        match self {
            Resolution::Cached(_) => "cache",
            Resolution::Remote(_) => "remote",
            Resolution::Environment(_) => "environment",
            Resolution::Default(_) => "default",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Resolution::Cached(v) | Resolution::Remote(v) | Resolution::Environment(v) => Some(v),
            Resolution::Default(v) => v.as_deref(),
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            Resolution::Cached(v) | Resolution::Remote(v) | Resolution::Environment(v) => Some(v),
            Resolution::Default(v) => v,
        }
    }
}

/// Decide a cache miss from the remote outcome and the environment value.
///
/// A remote hit wins. Any other remote outcome falls through to the
/// environment, and an absent environment variable yields `default`. A
/// variable that is set but empty is still an environment value.
pub fn decide(remote: RemoteLookup, env: Option<String>, default: Option<&str>) -> Resolution {
    match (remote, env) {
        (RemoteLookup::Found(value), _) => Resolution::Remote(value),
        (_, Some(value)) => Resolution::Environment(value),
        (_, None) => Resolution::Default(default.map(ToString::to_string)),
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolves named settings through the remote store with environment fallback
pub struct ConfigResolver {
    backend: Option<Arc<dyn KeyValueBackend>>,
    cache: RwLock<HashMap<String, String>>,
    env: EnvLookup,
}

impl ConfigResolver {
    /// Create a resolver. `None` means environment-only operation.
    pub fn new(backend: Option<Arc<dyn KeyValueBackend>>) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            env: Arc::new(process_env),
        }
    }

    /// Replace the process environment with another lookup
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Whether a remote store is configured
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Resolve `key`, falling back to `default` when no tier has it
    pub async fn resolve(&self, key: &str, default: Option<&str>) -> Option<String> {
        self.resolve_detailed(key, default).await.into_value()
    }

    /// Resolve `key` and report which tier answered
    pub async fn resolve_detailed(&self, key: &str, default: Option<&str>) -> Resolution {
        if let Some(value) = self.cache.read().get(key) {
            return Resolution::Cached(value.clone());
        }

        let remote = self.lookup_remote(key).await;
        let resolution = decide(remote, (self.env)(key), default);
        if resolution.is_cacheable() {
            if let Some(value) = resolution.value() {
                self.cache.write().insert(key.to_string(), value.to_string());
            }
        }
        resolution
    }

    /// Environment-only resolution for bootstrap values.
    ///
    /// Never consults the cache or the remote store.
    pub fn resolve_sync(&self, key: &str, default: Option<&str>) -> Option<String> {
        (self.env)(key).or_else(|| default.map(ToString::to_string))
    }

    /// Write `value` to the remote store and cache it.
    ///
    /// Returns `false` when no remote store is configured or the write fails.
    /// The process environment is never modified.
    pub async fn set(&self, key: &str, value: &str) -> bool {
        let Some(backend) = &self.backend else {
            warn!("Cannot set setting '{}' - remote store not available", key);
            return false;
        };

        match backend
            .upsert(Table::Settings, json!({ "key": key, "value": value }))
            .await
        {
            Ok(()) => {
                self.cache.write().insert(key.to_string(), value.to_string());
                info!("Successfully updated setting '{}' in remote store", key);
                true
            }
            Err(e) => {
                error!("Failed to set {} in remote store: {}", key, e);
                false
            }
        }
    }

    /// Drop every cached value
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Peek at the cached value for `key`
    pub fn cached(&self, key: &str) -> Option<String> {
        self.cache.read().get(key).cloned()
    }

    async fn lookup_remote(&self, key: &str) -> RemoteLookup {
        let Some(backend) = &self.backend else {
            return RemoteLookup::Disabled;
        };

        match backend.get(Table::Settings, key).await {
            Ok(Some(row)) => match row.get("value") {
                Some(serde_json::Value::String(value)) => RemoteLookup::Found(value.clone()),
                Some(serde_json::Value::Null) | None => {
                    warn!("Setting '{}' has no value in remote store, using local fallback", key);
                    RemoteLookup::Missing
                }
                Some(other) => RemoteLookup::Found(other.to_string()),
            },
            Ok(None) => {
                warn!("Setting '{}' not found in remote store, using local fallback", key);
                RemoteLookup::Missing
            }
            Err(e) => {
                error!("Error fetching {} from remote store: {}", key, e);
                RemoteLookup::Failed(e.to_string())
            }
        }
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("has_backend", &self.backend.is_some())
            .field("cached_keys", &self.cache.read().len())
            .finish()
    }
}
