//! Worker identity.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use widgetmesh_core::config::WorkerConfig;

/// Stable identifier of this worker process.
///
/// Resolved once at startup: the configured id when present, otherwise
/// `{id_prefix}-{pid}-{8 hex chars}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId(Arc<str>);

impl WorkerId {
    /// Resolve the worker id from configuration.
    pub fn resolve(config: &WorkerConfig) -> Self {
        match config.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Self(Arc::from(id)),
            _ => Self::generate(&config.id_prefix),
        }
    }

    /// Generate a process-unique id.
    pub fn generate(prefix: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(Arc::from(format!(
            "{prefix}-{}-{}",
            std::process::id(),
            &suffix[..8]
        )))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
