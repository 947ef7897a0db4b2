//! # DeviceGate
//!
//! Wires the token manager, task manager and resilient API client into one
//! [`AppContext`] that tool handlers share.

pub mod context;
pub mod utils;

pub use context::AppContext;
pub use utils::health::{ComponentHealth, HealthStatus};
