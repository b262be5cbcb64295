//! Value objects shared by every store.
//!
//! These carry no behavior beyond construction; the stores own every
//! record and collaborators only ever hold identifiers.

pub mod connection;
pub mod event;
pub mod session;
pub mod widget;

pub use connection::ConnectionInfo;
pub use event::EventMessage;
pub use session::UserSession;
pub use widget::WidgetData;

/// Open key/value map attached to widgets and sessions.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
