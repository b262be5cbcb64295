//! Worker identity configuration.

use serde::{Deserialize, Serialize};

/// Worker identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Explicit worker id. When unset, one is generated per process.
    #[serde(default)]
    pub id: Option<String>,
    /// Prefix used for generated worker ids.
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: None,
            id_prefix: default_id_prefix(),
        }
    }
}

fn default_id_prefix() -> String {
    "worker".to_string()
}
