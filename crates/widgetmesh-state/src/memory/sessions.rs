//! In-memory session store.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use widgetmesh_core::config::{SessionConfig, TtlConfig};
use widgetmesh_core::error::ensure_id;
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::SessionStore;
use widgetmesh_core::types::session::resolve_roles;
use widgetmesh_core::types::{Metadata, UserSession};

use super::expiring::Expiring;
use super::sweeper::Sweep;

/// Session store with a user → session ids index.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    /// Session id → session.
    sessions: Arc<DashMap<String, Expiring<UserSession>>>,
    /// User id → session ids.
    by_user: Arc<DashMap<String, HashSet<String>>>,
    /// Sliding lifetime.
    ttl: Duration,
    /// Roles used when none are given.
    default_roles: Arc<[String]>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new(ttl: &TtlConfig, sessions: &SessionConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            by_user: Arc::new(DashMap::new()),
            ttl: ttl.session(),
            default_roles: sessions.default_roles.clone().into(),
        }
    }

    fn unindex(&self, user_id: &str, session_id: &str) {
        if let Some(mut ids) = self.by_user.get_mut(user_id) {
            ids.remove(session_id);
        }
        self.by_user.remove_if(user_id, |_, ids| ids.is_empty());
    }

    fn live_session(&self, session_id: &str, now: Instant) -> Option<UserSession> {
        {
            let entry = self.sessions.get(session_id)?;
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        if let Some((_, stale)) = self.sessions.remove_if(session_id, |_, e| !e.is_live(now)) {
            self.unindex(&stale.value.user_id, session_id);
        }
        None
    }

    fn write_live(&self, session_id: &str, f: impl FnOnce(&mut Expiring<UserSession>)) -> bool {
        let now = Instant::now();
        {
            let Some(mut entry) = self.sessions.get_mut(session_id) else {
                return false;
            };
            if entry.is_live(now) {
                f(entry.value_mut());
                return true;
            }
        }
        self.live_session(session_id, now);
        false
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(
        &self,
        user_id: &str,
        roles: Option<BTreeSet<String>>,
        metadata: Option<Metadata>,
    ) -> AppResult<UserSession> {
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

        self.sessions.insert(
            session.session_id.clone(),
            Expiring::new(session.clone(), self.ttl),
        );
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(session.session_id.clone());

        debug!(session_id = %session.session_id, user_id, roles = ?session.roles, "Session created");
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> AppResult<Option<UserSession>> {
        Ok(self.live_session(session_id, Instant::now()))
    }

    async fn get_by_user(&self, user_id: &str) -> AppResult<Vec<UserSession>> {
        let session_ids: Vec<String> = match self.by_user.get(user_id) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };

        let now = Instant::now();
        let mut sessions = Vec::with_capacity(session_ids.len());
        for session_id in session_ids {
            match self.live_session(&session_id, now) {
                Some(session) if session.user_id == user_id => sessions.push(session),
                _ => self.unindex(user_id, &session_id),
            }
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    async fn update_roles(&self, session_id: &str, roles: BTreeSet<String>) -> AppResult<bool> {
        let roles = resolve_roles(Some(roles), &self.default_roles);
        let updated = self.write_live(session_id, |entry| entry.value.roles = roles);
        if updated {
            debug!(session_id, "Session roles replaced");
        }
        Ok(updated)
    }

    async fn delete(&self, session_id: &str) -> AppResult<bool> {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            return Ok(false);
        };
        self.unindex(&entry.value.user_id, session_id);
        debug!(session_id, user_id = %entry.value.user_id, "Session deleted");
        Ok(entry.is_live(Instant::now()))
    }

    async fn touch(&self, session_id: &str) -> AppResult<bool> {
        let ttl = self.ttl;
        Ok(self.write_live(session_id, |entry| {
            entry.value.last_touched = Utc::now();
            entry.refresh(ttl);
        }))
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

impl Sweep for MemorySessionStore {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.sessions.retain(|session_id, e| {
            let live = e.is_live(now);
            if !live {
                expired.push((e.value.user_id.clone(), session_id.clone()));
            }
            live
        });
        for (user_id, session_id) in &expired {
            self.unindex(user_id, session_id);
        }
        expired.len()
    }
}
