//! Store contracts implemented by every backend.
//!
//! Each trait has exactly two implementations in `widgetmesh-state`
//! (memory and Redis); the factory selects one set at startup.

pub mod connection_router;
pub mod event_bus;
pub mod session_store;
pub mod widget_store;

pub use connection_router::ConnectionRouter;
pub use event_bus::{EventBus, EventSubscription};
pub use session_store::SessionStore;
pub use widget_store::WidgetStore;
