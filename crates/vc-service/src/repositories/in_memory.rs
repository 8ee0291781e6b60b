//! In-memory record store.
//!
//! Used by tests and local development. Behaves like the Redis adapter:
//! versions start at 1 and increase by one per write.

use super::record_store::{PutOutcome, RecordStore, StoreError, VersionedValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory key-value store with per-key versions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    entries: Arc<RwLock<HashMap<String, VersionedValue>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable backend: every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Read a raw value without going through the trait (for assertions).
    pub async fn raw_value(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        self.check_available()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        let version = entries.get(key).map_or(0, |entry| entry.version) + 1;
        entries.insert(
            key.to_string(),
            VersionedValue {
                value: value.to_string(),
                version,
            },
        );
        Ok(version)
    }

    async fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<PutOutcome, StoreError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map(|entry| entry.version);

        if current != expected {
            return Ok(PutOutcome::Conflict);
        }

        let version = current.unwrap_or(0) + 1;
        entries.insert(
            key.to_string(),
            VersionedValue {
                value: value.to_string(),
                version,
            },
        );
        Ok(PutOutcome::Written { version })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
