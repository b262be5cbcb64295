//! Authenticated principal.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// An authenticated user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    /// Primary key.
    pub session_id: String,
    /// Owning user.
    pub user_id: String,
    /// Granted roles. Never empty.
    pub roles: BTreeSet<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub metadata: Metadata,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last `touch` (or creation).
    pub last_touched: DateTime<Utc>,
}

impl UserSession {
    /// Whether the session carries `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Resolve a requested role set against the configured defaults.
///
/// Blank role names are dropped; an empty result falls back to `defaults`.
pub fn resolve_roles<I, S>(requested: Option<I>, defaults: &[String]) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let roles: BTreeSet<String> = requested
        .into_iter()
        .flatten()
        .map(Into::into)
        .filter(|r: &String| !r.trim().is_empty())
        .collect();

    if roles.is_empty() {
        defaults.iter().filter(|r| !r.trim().is_empty()).cloned().collect()
    } else {
        roles
    }
}
