//! Process-local backend. Used by tests and by `backend = "memory"`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::PersistenceStore;

#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys written so far.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.blobs.get(key).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}
