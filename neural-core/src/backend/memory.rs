//! In-process backend

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{BackendError, BackendResult, KeyValueBackend, Table};

/// Backend keeping rows in a process-local map.
///
/// Counts calls per operation and can be switched to an unreachable state,
/// which makes it the backend of choice for exercising fallback paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: Mutex<HashMap<(Table, String), serde_json::Value>>,
    unavailable: AtomicBool,
    gets: AtomicUsize,
    upserts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Store a row directly, bypassing availability and counters
    pub fn seed(&self, table: Table, record: serde_json::Value) -> BackendResult<()> {
        let key = table.record_key(&record)?.to_string();
        self.rows.lock().insert((table, key), record);
        Ok(())
    }

    /// Read a row directly, bypassing availability and counters
    pub fn row(&self, table: Table, key: &str) -> Option<serde_json::Value> {
        self.rows.lock().get(&(table, key.to_string())).cloned()
    }

    /// Number of `get` calls received
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `upsert` calls received
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls received
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable("memory backend switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, table: Table, key: &str) -> BackendResult<Option<serde_json::Value>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.row(table, key))
    }

    async fn upsert(&self, table: Table, record: serde_json::Value) -> BackendResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let key = table.record_key(&record)?.to_string();

        let mut rows = self.rows.lock();
        match rows.get_mut(&(table, key.clone())) {
            Some(serde_json::Value::Object(existing)) => {
                if let serde_json::Value::Object(incoming) = record {
                    existing.extend(incoming);
                }
            }
            _ => {
                rows.insert((table, key), record);
            }
        }
        Ok(())
    }

    async fn delete(&self, table: Table, key: &str) -> BackendResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.rows.lock().remove(&(table, key.to_string())).is_some())
    }
}
