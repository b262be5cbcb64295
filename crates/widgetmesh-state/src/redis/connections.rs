//! Redis connection router.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Script};
use tracing::debug;

use widgetmesh_core::config::TtlConfig;
use widgetmesh_core::error::ensure_id;
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::ConnectionRouter;
use widgetmesh_core::types::ConnectionInfo;

use super::client::{RedisClient, expire_secs, map_err};
use super::codec::{self, RawHash};

/// Record a heartbeat on a live connection.
///
/// KEYS[1] = connection hash
/// ARGV[1] = heartbeat timestamp
/// ARGV[2] = ttl seconds
///
/// Returns 1 when the connection was live, 0 otherwise.
const HEARTBEAT_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('HSET', KEYS[1], 'last_heartbeat', ARGV[1])
    redis.call('EXPIRE', KEYS[1], ARGV[2])
    return 1
"#;

/// Connection router keyed `{prefix}:conn:{widget_id}`.
#[derive(Debug, Clone)]
pub struct RedisConnectionRouter {
    client: RedisClient,
    ttl: Duration,
    heartbeat: Script,
}

impl RedisConnectionRouter {
    /// Create a router over a connected client.
    pub fn new(client: RedisClient, config: &TtlConfig) -> Self {
        Self {
            client,
            ttl: config.connection(),
            heartbeat: Script::new(HEARTBEAT_SCRIPT),
        }
    }

    fn ttl_secs(&self) -> AppResult<i64> {
        expire_secs(self.ttl)
    }
}

#[async_trait]
impl ConnectionRouter for RedisConnectionRouter {
    async fn register(&self, connection: ConnectionInfo) -> AppResult<()> {
        let ttl = self.ttl_secs()?;
        ensure_id("widget_id", &connection.widget_id)?;
        ensure_id("worker_id", &connection.worker_id)?;

        let key = self.client.keys().connection(&connection.widget_id);
        let fields = codec::encode_connection(&connection);
        let mut conn = self.client.conn_mut();

        let _: () = redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        debug!(widget_id = %connection.widget_id, worker_id = %connection.worker_id, "Connection registered");
        Ok(())
    }

    async fn heartbeat(&self, widget_id: &str) -> AppResult<bool> {
        let ttl = self.ttl_secs()?;
        let key = self.client.keys().connection(widget_id);
        let mut conn = self.client.conn_mut();
        let alive: i64 = self
            .heartbeat
            .key(&key)
            .arg(codec::timestamp(Utc::now()))
            .arg(ttl)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(alive == 1)
    }

    async fn remove(&self, widget_id: &str) -> AppResult<bool> {
        let key = self.client.keys().connection(widget_id);
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn.del(&key).await.map_err(map_err)?;
        if removed > 0 {
            debug!(widget_id, "Connection removed");
        }
        Ok(removed > 0)
    }

    async fn get(&self, widget_id: &str) -> AppResult<Option<ConnectionInfo>> {
        let key = self.client.keys().connection(widget_id);
        let mut conn = self.client.conn_mut();
        let raw: RawHash = conn.hgetall(&key).await.map_err(map_err)?;
        Ok(codec::decode_connection(&key, raw))
    }

    async fn get_worker_connections(&self, worker_id: &str) -> AppResult<Vec<ConnectionInfo>> {
        let keys = self
            .client
            .scan_keys(&self.client.keys().connection_pattern())
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hgetall(key);
        }
        let mut conn = self.client.conn_mut();
        let records: Vec<RawHash> = pipe.query_async(&mut conn).await.map_err(map_err)?;

        // Keys can expire between SCAN and HGETALL; those decode as absent.
        let mut owned: Vec<ConnectionInfo> = keys
            .iter()
            .zip(records)
            .filter_map(|(key, raw)| codec::decode_connection(key, raw))
            .filter(|c| c.worker_id == worker_id)
            .collect();
        owned.sort_by(|a, b| a.widget_id.cmp(&b.widget_id));
        Ok(owned)
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.client.ping().await
    }
}
