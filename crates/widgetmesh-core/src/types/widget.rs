//! Widget record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// One renderable widget instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetData {
    /// Opaque primary key, unique for the widget's TTL lifetime.
    pub widget_id: String,
    /// Current content snapshot.
    pub html: String,
    /// Access credential.
    #[serde(default)]
    pub token: Option<String>,
    /// Worker that registered callbacks for this widget.
    #[serde(default)]
    pub owner_worker_id: Option<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub metadata: Metadata,
    /// When the widget was first registered.
    pub created_at: DateTime<Utc>,
}

impl WidgetData {
    /// Create a widget record with no token, owner, or metadata.
    pub fn new(widget_id: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            widget_id: widget_id.into(),
            html: html.into(),
            token: None,
            owner_worker_id: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach an access token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Record the owning worker.
    pub fn with_owner(mut self, worker_id: impl Into<String>) -> Self {
        self.owner_worker_id = Some(worker_id.into());
        self
    }

    /// Replace the metadata map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}
