//! Redis session store.
//!
//! Sessions live in `{prefix}:session:{id}` hashes; `{prefix}:user:{user_id}`
//! sets index them by user. The index carries the session TTL too, and ids
//! whose session has expired are removed lazily on lookup.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Script};
use tracing::debug;
use uuid::Uuid;

use widgetmesh_core::config::{SessionConfig, TtlConfig};
use widgetmesh_core::error::ensure_id;
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::SessionStore;
use widgetmesh_core::types::session::resolve_roles;
use widgetmesh_core::types::{Metadata, UserSession};

use super::client::{RedisClient, expire_secs, map_err};
use super::codec::{self, RawHash};

/// Replace the roles of an existing session.
///
/// KEYS[1] = session hash
/// ARGV[1] = JSON role array
const UPDATE_ROLES_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('HSET', KEYS[1], 'roles', ARGV[1])
    return 1
"#;

/// Slide the expiry of an existing session.
///
/// KEYS[1] = session hash
/// ARGV[1] = touch timestamp
/// ARGV[2] = ttl seconds
///
/// Returns the owning user id, or nil when the session does not exist.
const TOUCH_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return false
    end
    redis.call('HSET', KEYS[1], 'last_touched', ARGV[1])
    redis.call('EXPIRE', KEYS[1], ARGV[2])
    return redis.call('HGET', KEYS[1], 'user_id')
"#;

/// Session store over Redis hashes and per-user sets.
#[derive(Debug, Clone)]
pub struct RedisSessionStore {
    client: RedisClient,
    ttl: Duration,
    default_roles: Vec<String>,
    update_roles: Script,
    touch: Script,
}

impl RedisSessionStore {
    /// Create a store over a connected client.
    pub fn new(client: RedisClient, ttl: &TtlConfig, sessions: &SessionConfig) -> Self {
        Self {
            client,
            ttl: ttl.session(),
            default_roles: sessions.default_roles.clone(),
            update_roles: Script::new(UPDATE_ROLES_SCRIPT),
            touch: Script::new(TOUCH_SCRIPT),
        }
    }

    fn ttl_secs(&self) -> AppResult<i64> {
        expire_secs(self.ttl)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(
        &self,
        user_id: &str,
        roles: Option<BTreeSet<String>>,
        metadata: Option<Metadata>,
    ) -> AppResult<UserSession> {
        let ttl = self.ttl_secs()?;
        ensure_id("user_id", user_id)?;

        let now = Utc::now();
        let session = UserSession {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            roles: resolve_roles(roles, &self.default_roles),
            metadata: metadata.unwrap_or_default(),
            created_at: now,
            last_touched: now,
        };

        let key = self.client.keys().session(&session.session_id);
        let index = self.client.keys().user_sessions(user_id);
        let fields = codec::encode_session(&session)?;
        let mut conn = self.client.conn_mut();

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .sadd(&index, &session.session_id)
            .ignore()
            .expire(&index, ttl)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        debug!(session_id = %session.session_id, user_id, roles = ?session.roles, "Session created");
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> AppResult<Option<UserSession>> {
        let key = self.client.keys().session(session_id);
        let mut conn = self.client.conn_mut();
        let raw: RawHash = conn.hgetall(&key).await.map_err(map_err)?;
        Ok(codec::decode_session(&key, raw))
    }

    async fn get_by_user(&self, user_id: &str) -> AppResult<Vec<UserSession>> {
        let index = self.client.keys().user_sessions(user_id);
        let mut conn = self.client.conn_mut();
        let session_ids: Vec<String> = conn.smembers(&index).await.map_err(map_err)?;
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = session_ids
            .iter()
            .map(|id| self.client.keys().session(id))
            .collect();
        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hgetall(key);
        }
        let records: Vec<RawHash> = pipe.query_async(&mut conn).await.map_err(map_err)?;

        let mut sessions = Vec::with_capacity(records.len());
        let mut stale = Vec::new();
        for ((session_id, key), raw) in session_ids.iter().zip(&keys).zip(records) {
            match codec::decode_session(key, raw) {
                Some(session) if session.user_id == user_id => sessions.push(session),
                _ => stale.push(session_id.as_str()),
            }
        }

        if !stale.is_empty() {
            let _: () = conn.srem(&index, &stale).await.map_err(map_err)?;
            debug!(user_id, pruned = stale.len(), "Pruned expired sessions from user index");
        }

        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    async fn update_roles(&self, session_id: &str, roles: BTreeSet<String>) -> AppResult<bool> {
        let roles = resolve_roles(Some(roles), &self.default_roles);
        let key = self.client.keys().session(session_id);
        let mut conn = self.client.conn_mut();
        let updated: i64 = self
            .update_roles
            .key(&key)
            .arg(codec::encode_roles(&roles)?)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        if updated == 1 {
            debug!(session_id, "Session roles replaced");
        }
        Ok(updated == 1)
    }

    async fn delete(&self, session_id: &str) -> AppResult<bool> {
        let key = self.client.keys().session(session_id);
        let mut conn = self.client.conn_mut();
        let user_id: Option<String> = conn.hget(&key, codec::USER_ID).await.map_err(map_err)?;

        let removed: i64 = match &user_id {
            Some(user_id) => {
                let index = self.client.keys().user_sessions(user_id);
                let (removed,): (i64,) = redis::pipe()
                    .atomic()
                    .del(&key)
                    .srem(&index, session_id)
                    .ignore()
                    .query_async(&mut conn)
                    .await
                    .map_err(map_err)?;
                removed
            }
            None => conn.del(&key).await.map_err(map_err)?,
        };

        if removed > 0 {
            debug!(session_id, user_id = ?user_id, "Session deleted");
        }
        Ok(removed > 0)
    }

    async fn touch(&self, session_id: &str) -> AppResult<bool> {
        let ttl = self.ttl_secs()?;
        let key = self.client.keys().session(session_id);
        let mut conn = self.client.conn_mut();
        let user_id: Option<String> = self
            .touch
            .key(&key)
            .arg(codec::timestamp(Utc::now()))
            .arg(ttl)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        let Some(user_id) = user_id else {
            return Ok(false);
        };
        let index = self.client.keys().user_sessions(&user_id);
        let _: bool = conn.expire(&index, ttl).await.map_err(map_err)?;
        Ok(true)
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.client.ping().await
    }
}
