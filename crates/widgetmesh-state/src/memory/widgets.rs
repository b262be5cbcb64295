//! In-memory widget store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use widgetmesh_core::config::TtlConfig;
use widgetmesh_core::error::ensure_id;
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::WidgetStore;
use widgetmesh_core::types::WidgetData;

use super::expiring::Expiring;
use super::sweeper::Sweep;

/// Widget store backed by a [`DashMap`].
#[derive(Debug, Clone)]
pub struct MemoryWidgetStore {
    /// Widget id → record.
    widgets: Arc<DashMap<String, Expiring<WidgetData>>>,
    /// Lifetime of a registration.
    ttl: Duration,
    /// Whether `update_html` restarts the TTL.
    refresh_on_update: bool,
}

impl MemoryWidgetStore {
    /// Create an empty store.
    pub fn new(config: &TtlConfig) -> Self {
        Self {
            widgets: Arc::new(DashMap::new()),
            ttl: config.widget(),
            refresh_on_update: config.refresh_widget_on_update,
        }
    }

    /// Read a live widget through `f`, dropping it if it has expired.
    fn read_live<R>(&self, widget_id: &str, f: impl FnOnce(&WidgetData) -> R) -> Option<R> {
        let now = Instant::now();
        {
            let entry = self.widgets.get(widget_id)?;
            if entry.is_live(now) {
                return Some(f(&entry.value));
            }
        }
        self.widgets.remove_if(widget_id, |_, e| !e.is_live(now));
        None
    }

    /// Mutate a live widget through `f`. Returns whether it was live.
    fn write_live(&self, widget_id: &str, f: impl FnOnce(&mut Expiring<WidgetData>)) -> bool {
        let now = Instant::now();
        {
            let Some(mut entry) = self.widgets.get_mut(widget_id) else {
                return false;
            };
            if entry.is_live(now) {
                f(entry.value_mut());
                return true;
            }
        }
        self.widgets.remove_if(widget_id, |_, e| !e.is_live(now));
        false
    }
}

#[async_trait]
impl WidgetStore for MemoryWidgetStore {
    async fn register(&self, widget: WidgetData) -> AppResult<()> {
        ensure_id("widget_id", &widget.widget_id)?;
        debug!(widget_id = %widget.widget_id, owner = ?widget.owner_worker_id, "Widget registered");
        self.widgets
            .insert(widget.widget_id.clone(), Expiring::new(widget, self.ttl));
        Ok(())
    }

    async fn get(&self, widget_id: &str) -> AppResult<Option<WidgetData>> {
        Ok(self.read_live(widget_id, Clone::clone))
    }

    async fn get_html(&self, widget_id: &str) -> AppResult<Option<String>> {
        Ok(self.read_live(widget_id, |w| w.html.clone()))
    }

    async fn get_token(&self, widget_id: &str) -> AppResult<Option<String>> {
        Ok(self.read_live(widget_id, |w| w.token.clone()).flatten())
    }

    async fn exists(&self, widget_id: &str) -> AppResult<bool> {
        Ok(self.read_live(widget_id, |_| ()).is_some())
    }

    async fn update_html(&self, widget_id: &str, html: &str) -> AppResult<bool> {
        let refresh = self.refresh_on_update.then_some(self.ttl);
        Ok(self.write_live(widget_id, |entry| {
            entry.value.html = html.to_string();
            if let Some(ttl) = refresh {
                entry.refresh(ttl);
            }
        }))
    }

    async fn refresh_ttl(&self, widget_id: &str) -> AppResult<bool> {
        let ttl = self.ttl;
        Ok(self.write_live(widget_id, |entry| entry.refresh(ttl)))
    }

    async fn delete(&self, widget_id: &str) -> AppResult<bool> {
        let removed = self
            .widgets
            .remove(widget_id)
            .is_some_and(|(_, e)| e.is_live(Instant::now()));
        if removed {
            debug!(widget_id, "Widget deleted");
        }
        Ok(removed)
    }

    async fn list_active(&self) -> AppResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .widgets
            .iter()
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

impl Sweep for MemoryWidgetStore {
    fn name(&self) -> &'static str {
        "widgets"
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.widgets.retain(|_, e| {
            let live = e.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }
}
