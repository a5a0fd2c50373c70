//! Remote key-value store used as the durable tier
//!
//! Both the settings resolver and the conversation store talk to the remote
//! store through [`KeyValueBackend`], so tests can swap in [`MemoryBackend`].

pub mod memory;
pub mod supabase;

pub use memory::MemoryBackend;
pub use supabase::SupabaseBackend;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{StorageConfig, StorageMode};

/// Error type for remote store operations
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Tables the assistant reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Named settings, one row per key
    Settings,
    /// Per-user conversation transcripts
    Conversations,
}

impl Table {
    /// Remote table name
    pub fn name(&self) -> &'static str {
        match self {
            Table::Settings => "environment_variables",
            Table::Conversations => "user_conversations",
        }
    }

    /// Column holding the row key
    pub fn key_column(&self) -> &'static str {
        match self {
            Table::Settings => "key",
            Table::Conversations => "user_id",
        }
    }

    /// Extract the key of a record destined for this table
    pub fn record_key<'a>(&self, record: &'a serde_json::Value) -> BackendResult<&'a str> {
        record
            .get(self.key_column())
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BackendError::InvalidRecord(format!(
                    "{} record is missing string column '{}'",
                    self.name(),
                    self.key_column()
                ))
            })
    }
}

/// Abstract remote store
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Fetch the row stored under `key`, if any
    async fn get(&self, table: Table, key: &str) -> BackendResult<Option<serde_json::Value>>;

    /// Insert a record or merge it into the existing row with the same key
    async fn upsert(&self, table: Table, record: serde_json::Value) -> BackendResult<()>;

    /// Remove the row stored under `key`. Returns whether a row was removed.
    async fn delete(&self, table: Table, key: &str) -> BackendResult<bool>;
}

/// Build the remote backend described by `storage`.
///
/// Returns `None` in local mode, when credentials are missing, or when
/// construction fails. A `None` here means environment-only operation for
/// the rest of the process; connectivity is never retried.
pub fn connect_backend(storage: &StorageConfig) -> Option<Arc<dyn KeyValueBackend>> {
    if storage.mode != StorageMode::Supabase {
        info!("Storage mode is local, using environment variables only");
        return None;
    }

    let (url, key) = match (&storage.supabase_url, &storage.supabase_anon_key) {
        (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => (url, key),
        _ => {
            warn!("Supabase storage requested but SUPABASE_URL or SUPABASE_ANON_KEY is missing");
            return None;
        }
    };

    match SupabaseBackend::new(url, key) {
        Ok(backend) => {
            info!("Supabase client initialized successfully");
            Some(Arc::new(backend))
        }
        Err(e) => {
            error!("Failed to initialize Supabase client: {}", e);
            info!("Falling back to local environment variables");
            None
        }
    }
}
