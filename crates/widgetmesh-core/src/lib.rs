//! # widgetmesh-core
//!
//! Core crate for widgetmesh. Contains the four store traits, configuration
//! schemas, the shared value types that cross the worker boundary, and the
//! unified error system.
//!
//! This crate has **no** dependency on any storage backend.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
