//! # DeviceGate Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The HTTP transport (`reqwest`)
//! - The resilient API client and its factory
//! - The HTTP token refresher used by `TokenManager`
//! - Configuration loading from files and environment
//!
//! ## Architecture
//! - Implements traits defined in `devicegate-core`
//! - Contains all I/O; the core crates stay transport-free

pub mod api;
pub mod config;
pub mod errors;
pub mod http;

// Re-export commonly used items
pub use api::{
    AccessTokenProvider, ApiClient, ApiClientConfig, ApiClientFactory, ApiTokenRefresher,
    RequestOptions, ResponseShape,
};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
