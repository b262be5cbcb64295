//! Record lifetime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Longest accepted lifetime for any record: ten years.
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 86_400;

/// Time-to-live settings for every record kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Widget lifetime in seconds.
    #[serde(default = "default_widget")]
    pub widget_seconds: u64,
    /// Connection heartbeat lifetime in seconds.
    #[serde(default = "default_connection")]
    pub connection_seconds: u64,
    /// Session lifetime in seconds (sliding, refreshed by `touch`).
    #[serde(default = "default_session")]
    pub session_seconds: u64,
    /// Whether `update_html` restarts the widget TTL.
    #[serde(default)]
    pub refresh_widget_on_update: bool,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            widget_seconds: default_widget(),
            connection_seconds: default_connection(),
            session_seconds: default_session(),
            refresh_widget_on_update: false,
        }
    }
}

impl TtlConfig {
    /// Widget lifetime.
    pub fn widget(&self) -> Duration {
        Duration::from_secs(self.widget_seconds.min(MAX_TTL_SECONDS))
    }

    /// Connection heartbeat lifetime.
    pub fn connection(&self) -> Duration {
        Duration::from_secs(self.connection_seconds.min(MAX_TTL_SECONDS))
    }

    /// Session lifetime.
    pub fn session(&self) -> Duration {
        Duration::from_secs(self.session_seconds.min(MAX_TTL_SECONDS))
    }

    pub(crate) fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("ttl.widget_seconds", self.widget_seconds),
            ("ttl.connection_seconds", self.connection_seconds),
            ("ttl.session_seconds", self.session_seconds),
        ] {
            if value == 0 {
                return Err(AppError::configuration(format!("{name} must be positive")));
            }
            if value > MAX_TTL_SECONDS {
                return Err(AppError::configuration(format!(
                    "{name} must not exceed {MAX_TTL_SECONDS} seconds"
                )));
            }
        }
        Ok(())
    }
}

fn default_widget() -> u64 {
    86_400
}

fn default_connection() -> u64 {
    300
}

fn default_session() -> u64 {
    86_400
}
