//! Convenience result type alias for widgetmesh.

use crate::error::AppError;

/// A specialized `Result` type for store operations.
///
/// Every store method returns this so that a transport failure can be
/// propagated with `?` from any backend.
pub type AppResult<T> = Result<T, AppError>;
