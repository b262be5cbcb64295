//! Session defaults.

use serde::{Deserialize, Serialize};

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Roles assigned when a session is created or updated without any.
    #[serde(default = "default_roles")]
    pub default_roles: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_roles: default_roles(),
        }
    }
}

fn default_roles() -> Vec<String> {
    vec!["viewer".to_string()]
}
