//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use uuid::Uuid;

use widgetmesh_core::config::{Backend, StateConfig};
use widgetmesh_state::StateContext;

/// Environment variable pointing the Redis suite at a live server.
pub const REDIS_URL_VAR: &str = "WIDGETMESH_TEST_REDIS_URL";

/// Memory-backed configuration with a fixed worker id.
pub fn memory_config(worker_id: &str) -> StateConfig {
    let mut config = StateConfig::default();
    config.worker.id = Some(worker_id.to_string());
    config
}

/// Build a memory-backed context.
pub async fn memory_context(worker_id: &str) -> StateContext {
    StateContext::new(memory_config(worker_id))
        .await
        .expect("Failed to build memory context")
}

/// A key prefix no other test run shares.
pub fn unique_prefix() -> String {
    format!("wmtest-{}", Uuid::new_v4().simple())
}

/// Redis-backed configuration, or `None` when no test server is configured.
pub fn redis_config(worker_id: &str, prefix: &str) -> Option<StateConfig> {
    let url = std::env::var(REDIS_URL_VAR).ok()?;
    let mut config = memory_config(worker_id);
    config.backend = Backend::Redis;
    config.redis.url = url;
    config.redis.prefix = prefix.to_string();
    // Leftovers from aborted runs expire on their own.
    config.ttl.widget_seconds = 120;
    config.ttl.session_seconds = 120;
    config.ttl.connection_seconds = 60;
    Some(config)
}

/// Build a Redis-backed context, or `None` when the suite is skipped.
pub async fn redis_context(worker_id: &str, prefix: &str) -> Option<StateContext> {
    redis_context_with(worker_id, prefix, |_| {}).await
}

/// Like [`redis_context`], with `tweak` applied to the configuration first.
pub async fn redis_context_with(
    worker_id: &str,
    prefix: &str,
    tweak: impl FnOnce(&mut StateConfig),
) -> Option<StateContext> {
    let Some(mut config) = redis_config(worker_id, prefix) else {
        eprintln!("{REDIS_URL_VAR} not set; skipping Redis test");
        return None;
    };
    tweak(&mut config);
    Some(
        StateContext::new(config)
            .await
            .expect("Failed to connect to test Redis"),
    )
}

/// Upper bound on waiting for a cross-worker event.
pub const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Direct connection to the test server, for inspecting and corrupting keys.
pub async fn raw_redis() -> Option<redis::aio::MultiplexedConnection> {
    let url = std::env::var(REDIS_URL_VAR).ok()?;
    let client = redis::Client::open(url).expect("Invalid test Redis URL");
    Some(
        client
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to test Redis"),
    )
}

/// Remaining lifetime of `key` in milliseconds (-2 when missing).
pub async fn pttl(conn: &mut redis::aio::MultiplexedConnection, key: &str) -> i64 {
    redis::cmd("PTTL")
        .arg(key)
        .query_async(conn)
        .await
        .expect("PTTL failed")
}

/// `url` authenticating as `user` instead of its own credentials.
pub fn url_with_user(url: &str, user: &str, password: &str) -> String {
    let (scheme, rest) = url.split_once("://").unwrap_or(("redis", url));
    let host = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    format!("{scheme}://{user}:{password}@{host}")
}
