//! # DeviceGate Core
//!
//! Token lifecycle and task tracking - no HTTP or platform code.
//!
//! This crate contains:
//! - `TokenManager`: holds the current token, refreshes it on a timer
//! - `TaskManager`: tracks long-running remote operations
//! - Port interfaces (traits) implemented by `devicegate-infra`
//!
//! ## Architecture Principles
//! - Only depends on `devicegate-common` and `devicegate-domain`
//! - Time comes from an injected `Clock`; timers are cancellable handles
//! - All external dependencies via traits

pub mod auth;
pub mod tasks;

pub use auth::ports::TokenRefresher;
pub use auth::{TokenManager, TokenManagerConfig};
pub use tasks::{TaskCallback, TaskErrorCallback, TaskManager, TaskManagerConfig, TaskOptions};
