//! Redis backend for multi-worker deployments.

pub mod client;
mod codec;
pub mod connections;
pub mod events;
pub mod sessions;
pub mod widgets;

pub use client::RedisClient;
pub use connections::RedisConnectionRouter;
pub use events::RedisEventBus;
pub use sessions::RedisSessionStore;
pub use widgets::RedisWidgetStore;
