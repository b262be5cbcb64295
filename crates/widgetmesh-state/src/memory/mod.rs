//! In-process backend.
//!
//! Every store keeps its records in [`dashmap::DashMap`]s, so a mutation
//! only locks one shard. Expiry is enforced lazily on access and by a
//! background [`sweeper`], which together make an expired record
//! indistinguishable from one that never existed.

pub mod connections;
pub mod events;
pub mod expiring;
pub mod sessions;
pub mod sweeper;
pub mod widgets;

pub use connections::MemoryConnectionRouter;
pub use events::MemoryEventBus;
pub use sessions::MemorySessionStore;
pub use sweeper::{Sweep, spawn_sweeper};
pub use widgets::MemoryWidgetStore;
