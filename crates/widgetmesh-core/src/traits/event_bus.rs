//! Cross-worker event bus contract.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::result::AppResult;
use crate::types::EventMessage;

/// Fans events out to subscribers, locally and across workers.
///
/// Delivery is at-most-once: a subscriber that is not connected when an
/// event is published never sees it. Order is preserved within one widget
/// channel only.
#[async_trait]
pub trait EventBus: Send + Sync + std::fmt::Debug + 'static {
    /// Deliver to every subscriber of `event.widget_id` on every worker.
    async fn publish(&self, event: EventMessage) -> AppResult<()>;

    /// Open a stream of events for one widget.
    async fn subscribe(&self, widget_id: &str) -> AppResult<EventSubscription>;

    /// Deliver only to `worker_id`'s local subscribers of `event.widget_id`.
    async fn publish_to_worker(&self, worker_id: &str, event: EventMessage) -> AppResult<()>;

    /// Identity this bus stamps on published events and listens under.
    fn worker_id(&self) -> &str;

    /// Stop background listeners. Open subscriptions end.
    async fn shutdown(&self);

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// A cancellable, unbounded stream of events for one widget.
///
/// Dropping the subscription cancels it; any backend task feeding it stops
/// and releases its transport connection.
#[derive(Debug)]
pub struct EventSubscription {
    widget_id: String,
    rx: mpsc::UnboundedReceiver<EventMessage>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl EventSubscription {
    /// Wrap a receiver fed by a backend. `cancel` is triggered on
    /// [`cancel`](Self::cancel) or drop.
    pub fn new(
        widget_id: impl Into<String>,
        rx: mpsc::UnboundedReceiver<EventMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            widget_id: widget_id.into(),
            rx,
            cancel,
            _guard: guard,
        }
    }

    /// Widget this subscription listens to.
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    /// Next event, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        self.rx.recv().await
    }

    /// Next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        self.rx.try_recv().ok()
    }

    /// Stop the subscription. Buffered events can still be drained.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    /// Whether the subscription was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for EventSubscription {
    type Item = EventMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
