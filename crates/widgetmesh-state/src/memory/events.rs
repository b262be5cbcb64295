//! In-memory event bus for single-process deployments.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use widgetmesh_core::error::{AppError, ensure_id};
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::{EventBus, EventSubscription};
use widgetmesh_core::types::EventMessage;

use crate::hub::LocalHub;
use crate::worker::WorkerId;

/// Event bus delivering through a [`LocalHub`].
///
/// Buses built with [`with_hub`](Self::with_hub) over the same hub behave
/// like separate workers of one deployment: broadcasts reach all of them,
/// worker-targeted events only the addressed one.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    /// Local subscriber registry.
    hub: Arc<LocalHub>,
    /// Identity of this bus.
    worker_id: WorkerId,
    /// Fired on shutdown.
    closed: CancellationToken,
}

impl MemoryEventBus {
    /// Create a bus with its own hub.
    pub fn new(worker_id: WorkerId) -> Self {
        Self::with_hub(Arc::new(LocalHub::new()), worker_id)
    }

    /// Create a bus sharing `hub` with other buses.
    pub fn with_hub(hub: Arc<LocalHub>, worker_id: WorkerId) -> Self {
        Self {
            hub,
            worker_id,
            closed: CancellationToken::new(),
        }
    }

    fn stamp(&self, mut event: EventMessage) -> EventMessage {
        if event.source_worker_id.is_none() {
            event.source_worker_id = Some(self.worker_id.to_string());
        }
        event
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: EventMessage) -> AppResult<()> {
        ensure_id("widget_id", &event.widget_id)?;
        let event = self.stamp(event);
        let delivered = self.hub.deliver(&event);
        trace!(widget_id = %event.widget_id, event_type = %event.event_type, delivered, "Event published");
        Ok(())
    }

    async fn subscribe(&self, widget_id: &str) -> AppResult<EventSubscription> {
        ensure_id("widget_id", widget_id)?;
        if self.closed.is_cancelled() {
            return Err(AppError::service_unavailable("event bus has been shut down"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.closed.child_token();
        self.hub
            .attach_until(widget_id, &self.worker_id, tx, token.clone());
        debug!(widget_id, worker_id = %self.worker_id, "Local subscription opened");
        Ok(EventSubscription::new(widget_id, rx, token))
    }

    async fn publish_to_worker(&self, worker_id: &str, event: EventMessage) -> AppResult<()> {
        ensure_id("worker_id", worker_id)?;
        ensure_id("widget_id", &event.widget_id)?;
        let event = self.stamp(event).targeted(worker_id);
        let delivered = self.hub.deliver_to_worker(worker_id, &event);
        if delivered == 0 {
            debug!(
                worker_id,
                widget_id = %event.widget_id,
                "No local subscriber for worker-targeted event; dropped"
            );
        }
        Ok(())
    }

    fn worker_id(&self) -> &str {
        self.worker_id.as_str()
    }

    async fn shutdown(&self) {
        self.closed.cancel();
        let detached = self.hub.detach_worker(self.worker_id.as_str());
        debug!(worker_id = %self.worker_id, detached, "Local event bus stopped");
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(!self.closed.is_cancelled())
    }
}
