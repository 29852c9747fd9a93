//! Valkey (Redis-compatible) persistence backend.
//!
//! All keys are namespaced under a configurable prefix so several daemons
//! (e.g. one per deployment) can share a single Valkey without collisions.
//! Default prefix: "vaultwatch" → keys like "vaultwatch:history".

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use super::PersistenceStore;

#[derive(Clone)]
pub struct ValkeyStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl ValkeyStore {
    /// Connect to Valkey/Redis and verify the connection.
    pub async fn connect(url: &str, prefix: &str) -> anyhow::Result<Self> {
        let client = Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(response = %pong, "Valkey ping");
        info!(url = url, prefix = prefix, "connected to Valkey");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    /// Build a namespaced key: "{prefix}:{suffix}"
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }
}

#[async_trait]
impl PersistenceStore for ValkeyStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let blob: Option<String> = conn.get(self.key(key)).await?;
        Ok(blob)
    }

    async fn set(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.key(key), blob).await?;
        Ok(())
    }
}
