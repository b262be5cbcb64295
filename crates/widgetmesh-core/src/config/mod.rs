//! Configuration schemas for the state layer.
//!
//! The root [`StateConfig`] is deserialized from TOML files via the
//! `config` crate and overlaid with `WIDGETMESH__*` environment variables.
//! Each sub-module represents a logical configuration section.

pub mod logging;
pub mod memory;
pub mod redis;
pub mod session;
pub mod ttl;
pub mod worker;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::logging::LoggingConfig;
pub use self::memory::MemoryConfig;
pub use self::redis::RedisConfig;
pub use self::session::SessionConfig;
pub use self::ttl::{MAX_TTL_SECONDS, TtlConfig};
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Which backend serves the four stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single-process maps. No cross-worker coordination.
    #[default]
    Memory,
    /// Shared Redis instance (deploy mode).
    Redis,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Redis => write!(f, "redis"),
        }
    }
}

/// Root state-layer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: Backend,
    /// Redis connection and key layout.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Record lifetimes.
    #[serde(default)]
    pub ttl: TtlConfig,
    /// Worker identity.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Session defaults.
    #[serde(default)]
    pub session: SessionConfig,
    /// Memory backend tuning.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StateConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default.toml` with an environment-specific overlay
    /// and environment variables prefixed with `WIDGETMESH`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("WIDGETMESH")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("session.default_roles")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every record expire immediately or
    /// collide with another deployment's keys.
    pub fn validate(&self) -> Result<(), AppError> {
        self.ttl.validate()?;

        if self.backend == Backend::Redis {
            if self.redis.url.trim().is_empty() {
                return Err(AppError::configuration("redis.url must be set for the redis backend"));
            }
            if self.redis.prefix.trim().is_empty() {
                return Err(AppError::configuration("redis.prefix must not be empty"));
            }
            if self.redis.scan_count == 0 {
                return Err(AppError::configuration("redis.scan_count must be positive"));
            }
        }

        if self.session.default_roles.iter().all(|r| r.trim().is_empty()) {
            return Err(AppError::configuration(
                "session.default_roles must contain at least one role",
            ));
        }

        if self.memory.sweep_interval_seconds == 0 {
            return Err(AppError::configuration(
                "memory.sweep_interval_seconds must be positive",
            ));
        }

        Ok(())
    }

    /// Whether the shared backend is in use.
    pub fn is_deploy_mode(&self) -> bool {
        self.backend == Backend::Redis
    }
}
