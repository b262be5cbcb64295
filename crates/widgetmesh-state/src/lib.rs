//! # widgetmesh-state
//!
//! Backends for the four widgetmesh stores:
//!
//! - **memory**: in-process [dashmap](https://crates.io/crates/dashmap) maps
//!   with lazy expiry and a background sweep
//! - **redis**: Redis keys with native TTL and pub/sub channels, using the
//!   [redis](https://crates.io/crates/redis) crate
//!
//! The backend is selected once per process by [`StateContext`], which
//! also owns the worker identity.

pub mod hub;
pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod worker;

pub use provider::StateContext;
pub use worker::WorkerId;
