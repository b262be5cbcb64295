//! Redis connection management.

use std::time::Duration;

use redis::Client;
use redis::aio::{ConnectionManager, PubSub};
use tracing::{debug, info, warn};

use widgetmesh_core::config::RedisConfig;
use widgetmesh_core::error::{AppError, ErrorKind};
use widgetmesh_core::result::AppResult;

use crate::keys::KeySpace;

/// Redis client shared by every Redis-backed store.
///
/// Commands go through one multiplexed, reconnecting [`ConnectionManager`];
/// pub/sub subscriptions each open a dedicated connection from `client`.
#[derive(Debug, Clone)]
pub struct RedisClient {
    /// Factory for pub/sub connections.
    client: Client,
    /// Redis connection manager (pooled, reconnecting).
    conn: ConnectionManager,
    /// Key layout.
    keys: KeySpace,
    /// SCAN COUNT hint.
    scan_count: usize,
    /// Upper bound on keys returned by one scan.
    max_scan_keys: usize,
}

impl RedisClient {
    /// Create a new Redis client from configuration.
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        info!(url = %mask_redis_url(&config.url), prefix = %config.prefix, "Connecting to Redis");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid Redis URL", e)
        })?;

        let conn = ConnectionManager::new(client.clone()).await.map_err(|e| {
            AppError::with_source(ErrorKind::Transport, "Failed to connect to Redis", e)
        })?;

        info!("Successfully connected to Redis");
        Ok(Self {
            client,
            conn,
            keys: KeySpace::new(config.prefix.as_str()),
            scan_count: config.scan_count.max(1),
            max_scan_keys: config.max_scan_keys,
        })
    }

    /// Get a mutable clone of the connection manager.
    pub fn conn_mut(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Key layout for this namespace.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Open a dedicated pub/sub connection.
    pub async fn pubsub(&self) -> AppResult<PubSub> {
        self.client
            .get_async_pubsub()
            .await
            .map_err(map_err)
    }

    /// Collect keys matching `pattern` with a cursor-based SCAN.
    ///
    /// Stops once `max_scan_keys` keys have been collected; the result is
    /// then a partial view and a warning is logged.
    pub async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut conn = self.conn_mut();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;

            keys.extend(batch);
            if keys.len() >= self.max_scan_keys {
                keys.truncate(self.max_scan_keys);
                warn!(pattern, limit = self.max_scan_keys, "Scan limit reached; result truncated");
                break;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        debug!(pattern, count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> AppResult<bool> {
        let mut conn = self.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(pong == "PONG")
    }
}

/// Seconds argument for `EXPIRE`.
pub(crate) fn expire_secs(ttl: Duration) -> AppResult<i64> {
    i64::try_from(ttl.as_secs()).map_err(|_| {
        AppError::configuration(format!("TTL of {} seconds is out of range", ttl.as_secs()))
    })
}

/// Map a Redis error to an AppError.
pub(crate) fn map_err(e: redis::RedisError) -> AppError {
    AppError::with_source(ErrorKind::Transport, format!("Redis error: {e}"), e)
}

/// Mask password in Redis URL for safe logging.
pub(crate) fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}
