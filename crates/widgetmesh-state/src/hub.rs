//! In-process fan-out of events to local subscribers.
//!
//! Both event bus backends deliver through a [`LocalHub`]: the memory bus
//! directly, the Redis bus for events addressed to this worker. Each
//! subscriber is tagged with the worker that opened it so worker-targeted
//! delivery never reaches another worker's subscribers, even when several
//! workers share one hub inside a single process.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use widgetmesh_core::types::EventMessage;

use crate::worker::WorkerId;

#[derive(Debug)]
struct LocalSubscriber {
    id: u64,
    worker_id: WorkerId,
    tx: mpsc::UnboundedSender<EventMessage>,
}

/// Widget id → live local subscribers.
#[derive(Debug, Default)]
pub struct LocalHub {
    channels: DashMap<String, Vec<LocalSubscriber>>,
    next_id: AtomicU64,
}

impl LocalHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber opened by `worker_id` for `widget_id`.
    /// Returns the handle [`detach`](Self::detach) takes.
    pub fn attach(
        &self,
        widget_id: &str,
        worker_id: &WorkerId,
        tx: mpsc::UnboundedSender<EventMessage>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .entry(widget_id.to_string())
            .or_default()
            .push(LocalSubscriber {
                id,
                worker_id: worker_id.clone(),
                tx,
            });
        id
    }

    /// Attach a subscriber and detach it once `cancel` fires.
    ///
    /// [`EventSubscription`](widgetmesh_core::traits::EventSubscription)
    /// cancels its token on drop, so the entry never outlives the stream.
    pub fn attach_until(
        self: &Arc<Self>,
        widget_id: &str,
        worker_id: &WorkerId,
        tx: mpsc::UnboundedSender<EventMessage>,
        cancel: CancellationToken,
    ) {
        let id = self.attach(widget_id, worker_id, tx);
        let hub = self.clone();
        let widget_id = widget_id.to_string();
        tokio::spawn(async move {
            cancel.cancelled().await;
            hub.detach(&widget_id, id);
        });
    }

    /// Remove one subscriber. Returns whether it was attached.
    pub fn detach(&self, widget_id: &str, id: u64) -> bool {
        let mut removed = false;
        if let Some(mut subs) = self.channels.get_mut(widget_id) {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed = subs.len() != before;
        }
        self.channels.remove_if(widget_id, |_, subs| subs.is_empty());
        removed
    }

    /// Remove every subscriber opened by `worker_id`, ending their streams.
    /// Returns how many were removed.
    pub fn detach_worker(&self, worker_id: &str) -> usize {
        let mut removed = 0;
        self.channels.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.worker_id.as_str() != worker_id);
            removed += before - subs.len();
            !subs.is_empty()
        });
        removed
    }

    /// Deliver to every subscriber of `event.widget_id`.
    /// Returns the number of subscribers reached.
    pub fn deliver(&self, event: &EventMessage) -> usize {
        self.deliver_matching(event, |_| true)
    }

    /// Deliver only to subscribers opened by `worker_id`.
    pub fn deliver_to_worker(&self, worker_id: &str, event: &EventMessage) -> usize {
        self.deliver_matching(event, |sub| sub.worker_id.as_str() == worker_id)
    }

    fn deliver_matching<F>(&self, event: &EventMessage, filter: F) -> usize
    where
        F: Fn(&LocalSubscriber) -> bool,
    {
        let mut delivered = 0;
        let mut saw_closed = false;

        if let Some(subscribers) = self.channels.get(&event.widget_id) {
            for sub in subscribers.iter() {
                if !filter(sub) {
                    continue;
                }
                if sub.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    saw_closed = true;
                }
            }
        }

        if saw_closed {
            self.prune_widget(&event.widget_id);
        }

        trace!(
            widget_id = %event.widget_id,
            event_type = %event.event_type,
            namespace = ?event.namespace(),
            delivered,
            "Local delivery"
        );
        delivered
    }

    /// Number of widgets with at least one attached subscriber.
    pub fn widget_count(&self) -> usize {
        self.channels.len()
    }

    fn prune_widget(&self, widget_id: &str) {
        if let Some(mut subs) = self.channels.get_mut(widget_id) {
            subs.retain(|s| !s.tx.is_closed());
        }
        self.channels.remove_if(widget_id, |_, subs| subs.is_empty());
    }
}
