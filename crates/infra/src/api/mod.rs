//! Remote device-management API client
//!
//! # Architecture
//!
//! - [`HttpClient`](crate::http::HttpClient) performs single exchanges
//! - [`ApiClient`] adds auth, per-endpoint circuit breaking, retry and
//!   response normalization
//! - [`ApiTokenRefresher`] implements the token refresh port over HTTP
//! - [`ApiClientFactory`] keeps the create-once rule for the shared client
//!
//! Tokens never appear in log output.

pub mod auth;
pub mod client;
pub mod errors;
pub mod factory;
pub mod refresher;
pub mod response;

pub use auth::AccessTokenProvider;
pub use client::{ApiClient, ApiClientBuilder, ApiClientConfig, RequestOptions};
pub use errors::{status_error, StatusCategory};
pub use factory::ApiClientFactory;
pub use refresher::ApiTokenRefresher;
pub use response::{normalize, ResponseShape};
