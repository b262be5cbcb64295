//! WebSocket-to-worker binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One live WebSocket binding. At most one per widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Widget the socket serves.
    pub widget_id: String,
    /// Worker holding the socket.
    pub worker_id: String,
    /// When the socket was upgraded.
    pub connected_at: DateTime<Utc>,
    /// Last heartbeat seen.
    pub last_heartbeat: DateTime<Utc>,
}

impl ConnectionInfo {
    /// A connection established now.
    pub fn new(widget_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            widget_id: widget_id.into(),
            worker_id: worker_id.into(),
            connected_at: now,
            last_heartbeat: now,
        }
    }
}
