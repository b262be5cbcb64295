//! Redis pub/sub event bus.
//!
//! Broadcasts travel on `{prefix}:events:{widget_id}`. Every subscription
//! holds its own pub/sub connection to that channel, so a publisher's own
//! subscribers receive its events through Redis like everyone else's and
//! nothing is delivered twice. Worker-targeted events travel on
//! `{prefix}:worker:{worker_id}`, which a single listener per bus drains
//! into the [`LocalHub`]. That listener resubscribes with backoff when
//! its connection drops, and the bus reports unhealthy until it has.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::PubSub;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use widgetmesh_core::error::{AppError, ensure_id};
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::{EventBus, EventSubscription};
use widgetmesh_core::types::EventMessage;

use super::client::{RedisClient, map_err};
use crate::hub::LocalHub;
use crate::worker::WorkerId;

/// Event bus spanning every worker attached to one Redis namespace.
#[derive(Debug)]
pub struct RedisEventBus {
    client: RedisClient,
    /// Subscribers reachable by worker-targeted events.
    hub: Arc<LocalHub>,
    worker_id: WorkerId,
    /// Parent of every listener and relay token.
    shutdown: CancellationToken,
    /// Worker channel listener.
    listener: Mutex<Option<JoinHandle<()>>>,
    /// Whether the listener currently holds a live subscription.
    listening: Arc<AtomicBool>,
}

/// First delay before resubscribing after a failed attempt.
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);
/// Longest delay between resubscribe attempts.
const RESUBSCRIBE_BACKOFF_MAX: Duration = Duration::from_secs(30);

impl RedisEventBus {
    /// Create the bus and start listening on this worker's channel.
    pub async fn connect(client: RedisClient, worker_id: WorkerId) -> AppResult<Self> {
        let channel = client.keys().worker_channel(worker_id.as_str());
        let pubsub = subscribe_channel(&client, &channel).await?;

        let hub = Arc::new(LocalHub::new());
        let shutdown = CancellationToken::new();
        let listening = Arc::new(AtomicBool::new(true));
        let listener = tokio::spawn(
            WorkerListener {
                client: client.clone(),
                channel: channel.clone(),
                hub: hub.clone(),
                worker_id: worker_id.clone(),
                listening: listening.clone(),
                token: shutdown.child_token(),
            }
            .run(pubsub),
        );

        info!(worker_id = %worker_id, channel = %channel, "Worker channel listener started");
        Ok(Self {
            client,
            hub,
            worker_id,
            shutdown,
            listener: Mutex::new(Some(listener)),
            listening,
        })
    }

    fn stamp(&self, mut event: EventMessage) -> EventMessage {
        if event.source_worker_id.is_none() {
            event.source_worker_id = Some(self.worker_id.to_string());
        }
        event
    }

    async fn publish_on(&self, channel: &str, event: &EventMessage) -> AppResult<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.client.conn_mut();
        let receivers: i64 = conn.publish(channel, payload).await.map_err(map_err)?;
        trace!(channel, event_type = %event.event_type, receivers, "Event published");
        Ok(())
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, event: EventMessage) -> AppResult<()> {
        ensure_id("widget_id", &event.widget_id)?;
        let event = self.stamp(event);
        let channel = self.client.keys().events_channel(&event.widget_id);
        self.publish_on(&channel, &event).await
    }

    async fn subscribe(&self, widget_id: &str) -> AppResult<EventSubscription> {
        ensure_id("widget_id", widget_id)?;
        if self.shutdown.is_cancelled() {
            return Err(AppError::service_unavailable("event bus has been shut down"));
        }

        // SUBSCRIBE is confirmed before returning, so events published after
        // this call are never missed.
        let channel = self.client.keys().events_channel(widget_id);
        let pubsub = subscribe_channel(&self.client, &channel).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.shutdown.child_token();
        self.hub
            .attach_until(widget_id, &self.worker_id, tx.clone(), token.clone());
        tokio::spawn(relay_widget_channel(pubsub, channel, tx, token.clone()));

        debug!(widget_id, worker_id = %self.worker_id, "Redis subscription opened");
        Ok(EventSubscription::new(widget_id, rx, token))
    }

    async fn publish_to_worker(&self, worker_id: &str, event: EventMessage) -> AppResult<()> {
        ensure_id("worker_id", worker_id)?;
        ensure_id("widget_id", &event.widget_id)?;
        let event = self.stamp(event).targeted(worker_id);
        let channel = self.client.keys().worker_channel(worker_id);
        self.publish_on(&channel, &event).await
    }

    fn worker_id(&self) -> &str {
        self.worker_id.as_str()
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        let detached = self.hub.detach_worker(self.worker_id.as_str());
        if let Some(listener) = self.listener.lock().await.take() {
            if let Err(e) = listener.await {
                warn!(error = %e, "Worker channel listener ended abnormally");
            }
        }
        info!(worker_id = %self.worker_id, detached, "Event bus stopped");
    }

    async fn health_check(&self) -> AppResult<bool> {
        if self.shutdown.is_cancelled() {
            return Ok(false);
        }
        let running = self
            .listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !running || !self.listening.load(Ordering::Acquire) {
            warn!(worker_id = %self.worker_id, running, "Worker channel listener not subscribed");
            return Ok(false);
        }
        self.client.ping().await
    }
}

/// Open a pub/sub connection subscribed to `channel`.
async fn subscribe_channel(client: &RedisClient, channel: &str) -> AppResult<PubSub> {
    let mut pubsub = client.pubsub().await?;
    pubsub.subscribe(channel).await.map_err(map_err)?;
    Ok(pubsub)
}

/// Next delay in the resubscribe schedule.
fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(RESUBSCRIBE_BACKOFF_MAX)
}

/// How a drained subscription ended.
#[derive(Debug, PartialEq, Eq)]
enum Drained {
    Cancelled,
    ConnectionLost,
}

/// Keeps this worker's channel subscribed and drains it into the hub.
struct WorkerListener {
    client: RedisClient,
    channel: String,
    hub: Arc<LocalHub>,
    worker_id: WorkerId,
    listening: Arc<AtomicBool>,
    token: CancellationToken,
}

impl WorkerListener {
    /// Drain `pubsub`, resubscribing whenever the connection drops, until shut down.
    async fn run(self, pubsub: PubSub) {
        let mut current = Some(pubsub);
        let mut backoff = RESUBSCRIBE_BACKOFF;

        loop {
            let mut pubsub = match current.take() {
                Some(pubsub) => pubsub,
                None => {
                    let attempt = tokio::select! {
                        _ = self.token.cancelled() => break,
                        attempt = subscribe_channel(&self.client, &self.channel) => attempt,
                    };
                    match attempt {
                        Ok(pubsub) => {
                            info!(worker_id = %self.worker_id, channel = %self.channel, "Worker channel resubscribed");
                            backoff = RESUBSCRIBE_BACKOFF;
                            pubsub
                        }
                        Err(e) => {
                            warn!(
                                worker_id = %self.worker_id,
                                error = %e,
                                retry_in_ms = backoff.as_millis() as u64,
                                "Worker channel resubscribe failed"
                            );
                            tokio::select! {
                                _ = self.token.cancelled() => break,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                            backoff = next_backoff(backoff);
                            continue;
                        }
                    }
                }
            };

            self.listening.store(true, Ordering::Release);
            let drained = self.drain(&mut pubsub).await;
            self.listening.store(false, Ordering::Release);

            match drained {
                Drained::Cancelled => break,
                Drained::ConnectionLost => {
                    warn!(worker_id = %self.worker_id, "Worker channel connection lost; resubscribing");
                }
            }
        }
        debug!(worker_id = %self.worker_id, "Worker channel listener stopped");
    }

    async fn drain(&self, pubsub: &mut PubSub) -> Drained {
        let mut messages = pin!(pubsub.on_message());
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return Drained::Cancelled,
                msg = messages.next() => match msg {
                    Some(msg) => {
                        if let Some(event) = decode(&msg) {
                            self.hub.deliver_to_worker(self.worker_id.as_str(), &event);
                        }
                    }
                    None => return Drained::ConnectionLost,
                },
            }
        }
    }
}

/// Forward one widget channel into a subscriber until it goes away.
async fn relay_widget_channel(
    mut pubsub: PubSub,
    channel: String,
    tx: mpsc::UnboundedSender<EventMessage>,
    token: CancellationToken,
) {
    {
        let mut messages = pin!(pubsub.on_message());
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tx.closed() => break,
                msg = messages.next() => match msg {
                    Some(msg) => {
                        let Some(event) = decode(&msg) else { continue };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    None => {
                        warn!(channel = %channel, "Subscription connection closed");
                        break;
                    }
                },
            }
        }
    }

    if let Err(e) = pubsub.unsubscribe(&channel).await {
        debug!(channel = %channel, error = %e, "Unsubscribe failed; connection dropped");
    }
    debug!(channel = %channel, "Redis subscription closed");
}

fn decode(msg: &redis::Msg) -> Option<EventMessage> {
    let payload: String = match msg.get_payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(channel = msg.get_channel_name(), error = %e, "Unreadable event payload");
            return None;
        }
    };
    match serde_json::from_str(&payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(channel = msg.get_channel_name(), error = %e, "Malformed event dropped");
            None
        }
    }
}
