//! Backend factory and process-wide state handle.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use widgetmesh_core::config::{Backend, StateConfig};
use widgetmesh_core::error::AppError;
use widgetmesh_core::result::AppResult;
use widgetmesh_core::traits::{ConnectionRouter, EventBus, SessionStore, WidgetStore};

use crate::worker::WorkerId;

/// The four stores of one worker process, built for the configured backend.
///
/// Construct once at startup and share behind an `Arc`. Every accessor
/// returns the same instance for the lifetime of the context.
#[derive(Debug)]
pub struct StateContext {
    config: StateConfig,
    worker_id: WorkerId,
    widgets: Arc<dyn WidgetStore>,
    events: Arc<dyn EventBus>,
    connections: Arc<dyn ConnectionRouter>,
    sessions: Arc<dyn SessionStore>,
    /// Stops background tasks such as the memory sweeper.
    background: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Stores produced by one backend arm.
struct Stores {
    widgets: Arc<dyn WidgetStore>,
    events: Arc<dyn EventBus>,
    connections: Arc<dyn ConnectionRouter>,
    sessions: Arc<dyn SessionStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl StateContext {
    /// Validate `config`, resolve the worker id and build every store.
    pub async fn new(config: StateConfig) -> AppResult<Self> {
        config.validate()?;
        let worker_id = WorkerId::resolve(&config.worker);
        let background = CancellationToken::new();

        let stores = match config.backend {
            #[cfg(feature = "memory")]
            Backend::Memory => {
                info!("Initializing in-memory state backend");
                Self::memory_stores(&config, &worker_id, &background)
            }
            #[cfg(feature = "redis-backend")]
            Backend::Redis => {
                info!("Initializing Redis state backend");
                Self::redis_stores(&config, &worker_id).await?
            }
            #[allow(unreachable_patterns)]
            other => {
                return Err(AppError::configuration(format!(
                    "State backend '{other}' is not compiled into this build"
                )));
            }
        };

        info!(
            backend = %config.backend,
            worker_id = %worker_id,
            deploy_mode = config.is_deploy_mode(),
            "State context ready"
        );

        Ok(Self {
            config,
            worker_id,
            widgets: stores.widgets,
            events: stores.events,
            connections: stores.connections,
            sessions: stores.sessions,
            background,
            tasks: Mutex::new(stores.tasks),
        })
    }

    #[cfg(feature = "memory")]
    fn memory_stores(
        config: &StateConfig,
        worker_id: &WorkerId,
        background: &CancellationToken,
    ) -> Stores {
        use crate::memory::{
            MemoryConnectionRouter, MemoryEventBus, MemorySessionStore, MemoryWidgetStore, Sweep,
            spawn_sweeper,
        };

        let widgets = Arc::new(MemoryWidgetStore::new(&config.ttl));
        let connections = Arc::new(MemoryConnectionRouter::new(&config.ttl));
        let sessions = Arc::new(MemorySessionStore::new(&config.ttl, &config.session));

        let sweeper = spawn_sweeper(
            vec![
                widgets.clone() as Arc<dyn Sweep>,
                connections.clone() as Arc<dyn Sweep>,
                sessions.clone() as Arc<dyn Sweep>,
            ],
            config.memory.sweep_interval(),
            background.child_token(),
        );

        Stores {
            widgets,
            events: Arc::new(MemoryEventBus::new(worker_id.clone())),
            connections,
            sessions,
            tasks: vec![sweeper],
        }
    }

    #[cfg(feature = "redis-backend")]
    async fn redis_stores(config: &StateConfig, worker_id: &WorkerId) -> AppResult<Stores> {
        use crate::redis::{
            RedisClient, RedisConnectionRouter, RedisEventBus, RedisSessionStore,
            RedisWidgetStore,
        };

        let client = RedisClient::connect(&config.redis).await?;
        let events = RedisEventBus::connect(client.clone(), worker_id.clone()).await?;

        Ok(Stores {
            widgets: Arc::new(RedisWidgetStore::new(client.clone(), &config.ttl)),
            events: Arc::new(events),
            connections: Arc::new(RedisConnectionRouter::new(client.clone(), &config.ttl)),
            sessions: Arc::new(RedisSessionStore::new(client, &config.ttl, &config.session)),
            tasks: Vec::new(),
        })
    }

    /// Widget registrations.
    pub fn widget_store(&self) -> Arc<dyn WidgetStore> {
        self.widgets.clone()
    }

    /// Event fan-out.
    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        self.events.clone()
    }

    /// Widget → worker routing.
    pub fn connection_router(&self) -> Arc<dyn ConnectionRouter> {
        self.connections.clone()
    }

    /// Authenticated sessions.
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    /// Whether state is shared through Redis.
    pub fn is_deploy_mode(&self) -> bool {
        self.config.is_deploy_mode()
    }

    /// Identity of this worker.
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Configuration the context was built from.
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Whether every store can reach its backend.
    pub async fn health_check(&self) -> AppResult<bool> {
        let widgets = self.widgets.health_check().await?;
        let events = self.events.health_check().await?;
        let connections = self.connections.health_check().await?;
        let sessions = self.sessions.health_check().await?;

        let healthy = widgets && events && connections && sessions;
        if !healthy {
            warn!(widgets, events, connections, sessions, "State backend unhealthy");
        }
        Ok(healthy)
    }

    /// Release this worker's connections and stop background work.
    ///
    /// Returns how many connections were released. Background tasks are
    /// stopped even when releasing the connections fails.
    pub async fn shutdown(&self) -> AppResult<usize> {
        let released = self
            .connections
            .remove_worker_connections(self.worker_id.as_str())
            .await;

        self.events.shutdown().await;
        self.background.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        match &released {
            Ok(count) => info!(worker_id = %self.worker_id, released = count, "State context shut down"),
            Err(e) => warn!(worker_id = %self.worker_id, error = %e, "Failed to release worker connections"),
        }
        released
    }
}
