//! # DeviceGate Domain
//!
//! Data model shared by the DeviceGate crates.
//!
//! This crate contains:
//! - Token types (`AuthToken`, `TokenValidation`, `TokenEvent`)
//! - Task types and the `TaskStatus` state machine
//! - The generic API response envelope
//! - Configuration structures
//!
//! ## Architecture
//! - Depends only on the foundation tier of `devicegate-common`
//! - No I/O, no async runtime

pub mod config;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use devicegate_common::error::{ErrorCode, GatewayError, GatewayResult};
pub use types::*;
