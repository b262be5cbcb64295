//! Key and channel builders for every Redis entry.
//!
//! Centralising key construction keeps the layout in one place:
//! `{prefix}:widget:{id}`, `{prefix}:conn:{id}`, `{prefix}:session:{id}`,
//! `{prefix}:user:{user_id}` and the `events`/`worker` channels.

/// Builds prefix-qualified keys and channel names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Create a key space. A trailing `:` on the prefix is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches(':').to_string(),
        }
    }

    /// The namespace without trailing separator.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // ── Widgets ───────────────────────────────────────────────

    /// Hash holding one widget record.
    pub fn widget(&self, widget_id: &str) -> String {
        format!("{}:widget:{widget_id}", self.prefix)
    }

    /// SCAN pattern matching every widget key.
    pub fn widget_pattern(&self) -> String {
        format!("{}:widget:*", self.prefix)
    }

    /// Recover the widget id from a widget key.
    pub fn widget_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.prefix)?.strip_prefix(":widget:")
    }

    // ── Connections ───────────────────────────────────────────

    /// Hash holding one connection record.
    pub fn connection(&self, widget_id: &str) -> String {
        format!("{}:conn:{widget_id}", self.prefix)
    }

    /// SCAN pattern matching every connection key.
    pub fn connection_pattern(&self) -> String {
        format!("{}:conn:*", self.prefix)
    }

    // ── Sessions ──────────────────────────────────────────────

    /// Hash holding one session record.
    pub fn session(&self, session_id: &str) -> String {
        format!("{}:session:{session_id}", self.prefix)
    }

    /// Set of session ids belonging to a user.
    pub fn user_sessions(&self, user_id: &str) -> String {
        format!("{}:user:{user_id}", self.prefix)
    }

    // ── Channels ──────────────────────────────────────────────

    /// Broadcast channel for one widget.
    pub fn events_channel(&self, widget_id: &str) -> String {
        format!("{}:events:{widget_id}", self.prefix)
    }

    /// Channel addressed to a single worker.
    pub fn worker_channel(&self, worker_id: &str) -> String {
        format!("{}:worker:{worker_id}", self.prefix)
    }
}
