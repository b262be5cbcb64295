//! Values with a deadline.

use std::time::Duration;

use tokio::time::Instant;

use widgetmesh_core::config::MAX_TTL_SECONDS;

/// A stored value and the instant after which it no longer exists.
///
/// Uses the Tokio clock so tests can drive expiry with
/// `tokio::time::advance`.
#[derive(Debug, Clone)]
pub struct Expiring<T> {
    pub value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    /// Wrap `value`, expiring `ttl` from now.
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline(ttl),
        }
    }

    /// Whether the value is still live at `now`.
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Push the deadline to `ttl` from now.
    pub fn refresh(&mut self, ttl: Duration) {
        self.expires_at = deadline(ttl);
    }
}

/// `ttl` from now, capped at the longest accepted lifetime.
fn deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    let ttl = ttl.min(Duration::from_secs(MAX_TTL_SECONDS));
    now.checked_add(ttl).unwrap_or(now)
}
