//! Event crossing the worker boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event in transit. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Widget the event belongs to.
    pub widget_id: String,
    /// Namespaced event name, e.g. `plotly:click`.
    pub event_type: String,
    /// Arbitrary structured payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Worker the event is addressed to, if any.
    #[serde(default)]
    pub target_worker_id: Option<String>,
    /// Worker that published the event. Stamped by the bus when unset.
    #[serde(default)]
    pub source_worker_id: Option<String>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    /// Create an untargeted event.
    pub fn new(
        widget_id: impl Into<String>,
        event_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            widget_id: widget_id.into(),
            event_type: event_type.into(),
            data,
            target_worker_id: None,
            source_worker_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Address the event to one worker.
    pub fn targeted(mut self, worker_id: impl Into<String>) -> Self {
        self.target_worker_id = Some(worker_id.into());
        self
    }

    /// Namespace part of `event_type` (`plotly` for `plotly:click`).
    pub fn namespace(&self) -> Option<&str> {
        self.event_type.split_once(':').map(|(ns, _)| ns)
    }
}
