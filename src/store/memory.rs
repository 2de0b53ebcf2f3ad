use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheEntry, EntryMeta, EntryStore};
use crate::error::StorageError;
use crate::tile::CacheKey;

/// Entry store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(entry.key().clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan(&self) -> Result<Vec<EntryMeta>, StorageError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .map(|entry| entry.meta.clone())
            .collect())
    }
}
