//! Port interfaces for token refresh
//!
//! The token manager never talks HTTP itself; infrastructure supplies a
//! refresher.

use async_trait::async_trait;
use devicegate_domain::{GatewayResult, RefreshedToken};

/// Exchanges a refresh token for a new access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtain a new token
    async fn refresh(&self, refresh_token: &str) -> GatewayResult<RefreshedToken>;
}
