//! Redis backend configuration.

use serde::{Deserialize, Serialize};

/// Redis connection and key layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Namespace for every key and pub/sub channel.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// `COUNT` hint passed to each `SCAN` call.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
    /// Upper bound on keys returned by a single enumeration
    /// (`list_active`, `get_worker_connections`).
    #[serde(default = "default_max_scan_keys")]
    pub max_scan_keys: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            prefix: default_prefix(),
            scan_count: default_scan_count(),
            max_scan_keys: default_max_scan_keys(),
        }
    }
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_prefix() -> String {
    "widgetmesh".to_string()
}

fn default_scan_count() -> usize {
    500
}

fn default_max_scan_keys() -> usize {
    10_000
}
