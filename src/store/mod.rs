//! Durable key → blob persistence for the telemetry model.
//!
//! Three independently keyed blobs are kept, each a JSON array of plain
//! records:
//!   history        → event window (LogEvent records)
//!   pool_series    → pool reserve series (SeriesPoint records)
//!   vault_series   → vault price series (SeriesPoint records)
//!
//! plus `history_checkpoint`, the last block the stored window covers.
//!
//! The store has no transactions and no schema versioning. Readers go through
//! `load_records`, which treats a missing, corrupt or incompatible blob as an
//! empty state instead of an error.
//!
//! Every backend returned by `open` is wrapped in a `TimedStore`, so a stalled
//! disk or Valkey connection fails the call instead of holding up a tick.

pub mod bigint;
pub mod file;
pub mod memory;
pub mod valkey;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{StoreBackend, StoreConfig};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use valkey::ValkeyStore;

pub const HISTORY_KEY: &str = "history";
pub const POOL_SERIES_KEY: &str = "pool_series";
pub const VAULT_SERIES_KEY: &str = "vault_series";

/// Key of the last fully indexed block for the window stored under `key`.
/// Holds a plain decimal number, not a JSON array.
pub fn checkpoint_key(key: &str) -> String {
    format!("{key}_checkpoint")
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, blob: &str) -> anyhow::Result<()>;
}

/// Bounds every call on the inner store by `limit`.
pub struct TimedStore {
    inner: Arc<dyn PersistenceStore>,
    limit: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn PersistenceStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl PersistenceStore for TimedStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match tokio::time::timeout(self.limit, self.inner.get(key)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("store get {key:?} timed out after {:?}", self.limit),
        }
    }

    async fn set(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        match tokio::time::timeout(self.limit, self.inner.set(key, blob)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("store set {key:?} timed out after {:?}", self.limit),
        }
    }
}

/// Open the configured backend.
pub async fn open(config: &StoreConfig) -> anyhow::Result<Arc<dyn PersistenceStore>> {
    let store: Arc<dyn PersistenceStore> = match config.backend {
        StoreBackend::File => Arc::new(FileStore::open(&config.path).await?),
        StoreBackend::Valkey => {
            Arc::new(ValkeyStore::connect(&config.valkey_url, &config.prefix).await?)
        }
        StoreBackend::Memory => {
            warn!("memory store selected, state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };
    info!(
        backend = ?config.backend,
        timeout_ms = config.timeout_ms,
        "persistence store ready"
    );
    Ok(Arc::new(TimedStore::new(store, config.timeout())))
}

/// Read a JSON array of records. Missing, unreadable or unparsable blobs all
/// yield an empty vector.
pub async fn load_records<T: DeserializeOwned>(store: &dyn PersistenceStore, key: &str) -> Vec<T> {
    let blob = match store.get(key).await {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            debug!(key = key, "no persisted state");
            return Vec::new();
        }
        Err(e) => {
            warn!(key = key, error = %e, "failed to read persisted state, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<T>>(&blob) {
        Ok(records) => records,
        Err(e) => {
            warn!(
                key = key,
                error = %e,
                bytes = blob.len(),
                "persisted state is corrupt or incompatible, discarding"
            );
            Vec::new()
        }
    }
}

/// Serialize records as a JSON array and write them under `key`.
pub async fn save_records<'a, T, I>(store: &dyn PersistenceStore, key: &str, records: I) -> anyhow::Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let records: Vec<&T> = records.into_iter().collect();
    let json = serde_json::to_string(&records)?;
    store.set(key, &json).await?;
    debug!(key = key, records = records.len(), bytes = json.len(), "persisted");
    Ok(())
}
