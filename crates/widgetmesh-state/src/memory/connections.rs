//! In-memory connection router.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use widgetmesh_core::config::TtlConfig;
use widgetmesh_core::error::ensure_id;
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::ConnectionRouter;
use widgetmesh_core::types::ConnectionInfo;

use super::expiring::Expiring;
use super::sweeper::Sweep;

/// Connection router with a worker → widgets index.
///
/// The index is advisory: lookups always confirm ownership against the
/// primary map, so a stale index entry is harmless and gets pruned.
#[derive(Debug, Clone)]
pub struct MemoryConnectionRouter {
    /// Widget id → connection.
    connections: Arc<DashMap<String, Expiring<ConnectionInfo>>>,
    /// Worker id → widget ids.
    by_worker: Arc<DashMap<String, HashSet<String>>>,
    /// Heartbeat lifetime.
    ttl: Duration,
}

impl MemoryConnectionRouter {
    /// Create an empty router.
    pub fn new(config: &TtlConfig) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            by_worker: Arc::new(DashMap::new()),
            ttl: config.connection(),
        }
    }

    fn index(&self, worker_id: &str, widget_id: &str) {
        self.by_worker
            .entry(worker_id.to_string())
            .or_default()
            .insert(widget_id.to_string());
    }

    fn unindex(&self, worker_id: &str, widget_id: &str) {
        if let Some(mut widgets) = self.by_worker.get_mut(worker_id) {
            widgets.remove(widget_id);
        }
        self.by_worker.remove_if(worker_id, |_, widgets| widgets.is_empty());
    }

    fn live_connection(&self, widget_id: &str, now: Instant) -> Option<ConnectionInfo> {
        {
            let entry = self.connections.get(widget_id)?;
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        if let Some((_, stale)) = self.connections.remove_if(widget_id, |_, e| !e.is_live(now)) {
            self.unindex(&stale.value.worker_id, widget_id);
        }
        None
    }
}

#[async_trait]
impl ConnectionRouter for MemoryConnectionRouter {
    async fn register(&self, connection: ConnectionInfo) -> AppResult<()> {
        ensure_id("widget_id", &connection.widget_id)?;
        ensure_id("worker_id", &connection.worker_id)?;

        let widget_id = connection.widget_id.clone();
        let worker_id = connection.worker_id.clone();
        let previous = self
            .connections
            .insert(widget_id.clone(), Expiring::new(connection, self.ttl));

        if let Some(previous) = previous {
            if previous.value.worker_id != worker_id {
                debug!(
                    widget_id = %widget_id,
                    from = %previous.value.worker_id,
                    to = %worker_id,
                    "Connection moved to another worker"
                );
                self.unindex(&previous.value.worker_id, &widget_id);
            }
        }
        self.index(&worker_id, &widget_id);

        debug!(widget_id = %widget_id, worker_id = %worker_id, "Connection registered");
        Ok(())
    }

    async fn heartbeat(&self, widget_id: &str) -> AppResult<bool> {
        let now = Instant::now();
        {
            let Some(mut entry) = self.connections.get_mut(widget_id) else {
                return Ok(false);
            };
            if entry.is_live(now) {
                entry.value.last_heartbeat = Utc::now();
                entry.refresh(self.ttl);
                return Ok(true);
            }
        }
        // Reaped: make the absence visible everywhere before reporting it.
        self.live_connection(widget_id, now);
        Ok(false)
    }

    async fn remove(&self, widget_id: &str) -> AppResult<bool> {
        let Some((_, entry)) = self.connections.remove(widget_id) else {
            return Ok(false);
        };
        self.unindex(&entry.value.worker_id, widget_id);
        debug!(widget_id, worker_id = %entry.value.worker_id, "Connection removed");
        Ok(entry.is_live(Instant::now()))
    }

    async fn get(&self, widget_id: &str) -> AppResult<Option<ConnectionInfo>> {
        Ok(self.live_connection(widget_id, Instant::now()))
    }

    async fn get_worker_connections(&self, worker_id: &str) -> AppResult<Vec<ConnectionInfo>> {
        let widget_ids: Vec<String> = match self.by_worker.get(worker_id) {
            Some(widgets) => widgets.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };

        let now = Instant::now();
        let mut live = Vec::with_capacity(widget_ids.len());
        for widget_id in widget_ids {
            match self.live_connection(&widget_id, now) {
                Some(conn) if conn.worker_id == worker_id => live.push(conn),
                _ => self.unindex(worker_id, &widget_id),
            }
        }
        live.sort_by(|a, b| a.widget_id.cmp(&b.widget_id));
        Ok(live)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

impl Sweep for MemoryConnectionRouter {
    fn name(&self) -> &'static str {
        "connections"
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut reaped = Vec::new();
        self.connections.retain(|widget_id, e| {
            let live = e.is_live(now);
            if !live {
                reaped.push((e.value.worker_id.clone(), widget_id.clone()));
            }
            live
        });
        for (worker_id, widget_id) in &reaped {
            self.unindex(worker_id, widget_id);
        }
        reaped.len()
    }
}
