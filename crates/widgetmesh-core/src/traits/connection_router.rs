//! WebSocket connection router contract.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::ConnectionInfo;

/// Tracks which worker holds the live socket for each widget.
///
/// The router never evicts on its own: a connection that misses its
/// heartbeat TTL simply stops being visible.
#[async_trait]
pub trait ConnectionRouter: Send + Sync + std::fmt::Debug + 'static {
    /// Store the binding, superseding any previous one for the widget,
    /// and start its heartbeat TTL.
    async fn register(&self, connection: ConnectionInfo) -> AppResult<()>;

    /// Refresh the TTL. `false` means the connection was already reaped and
    /// the caller should register again.
    async fn heartbeat(&self, widget_id: &str) -> AppResult<bool>;

    /// Remove the binding. Returns whether anything was removed.
    async fn remove(&self, widget_id: &str) -> AppResult<bool>;

    /// Current binding for a widget.
    async fn get(&self, widget_id: &str) -> AppResult<Option<ConnectionInfo>>;

    /// Every live binding owned by `worker_id`.
    async fn get_worker_connections(&self, worker_id: &str) -> AppResult<Vec<ConnectionInfo>>;

    /// Remove every binding owned by `worker_id`. Returns how many were removed.
    async fn remove_worker_connections(&self, worker_id: &str) -> AppResult<usize> {
        let mut removed = 0;
        for connection in self.get_worker_connections(worker_id).await? {
            if self.remove(&connection.widget_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
