//! Session store contract.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{Metadata, UserSession};

/// Stores authenticated sessions with a sliding TTL and a user index.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug + 'static {
    /// Allocate a new session. Missing or empty `roles` fall back to the
    /// configured defaults.
    async fn create(
        &self,
        user_id: &str,
        roles: Option<BTreeSet<String>>,
        metadata: Option<Metadata>,
    ) -> AppResult<UserSession>;

    /// Fetch a session.
    async fn get(&self, session_id: &str) -> AppResult<Option<UserSession>>;

    /// Every live session of a user. Prunes index entries whose session
    /// has expired.
    async fn get_by_user(&self, user_id: &str) -> AppResult<Vec<UserSession>>;

    /// Replace the role set. Returns whether the session existed.
    async fn update_roles(&self, session_id: &str, roles: BTreeSet<String>) -> AppResult<bool>;

    /// Remove a session and its index entry. Returns whether it existed.
    async fn delete(&self, session_id: &str) -> AppResult<bool>;

    /// Restart the TTL without altering roles or metadata.
    /// Returns whether the session existed.
    async fn touch(&self, session_id: &str) -> AppResult<bool>;

    /// Whether the session exists and carries `role`.
    async fn has_role(&self, session_id: &str, role: &str) -> AppResult<bool> {
        Ok(self
            .get(session_id)
            .await?
            .is_some_and(|session| session.has_role(role)))
    }

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
