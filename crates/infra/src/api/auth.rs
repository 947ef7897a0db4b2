//! Access-token source used by the API client

use async_trait::async_trait;
use devicegate_common::error::{GatewayError, GatewayResult};
use devicegate_common::time::Clock;
use devicegate_core::TokenManager;

/// Trait for providing access tokens
///
/// This trait allows dependency injection and testing with mock providers.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Get a valid access token, refreshing first if it is about to expire
    async fn access_token(&self) -> GatewayResult<String>;

    /// Force a refresh after the remote API rejected the current token and
    /// return the replacement
    async fn refresh_access_token(&self) -> GatewayResult<String>;
}

#[async_trait]
impl<C: Clock> AccessTokenProvider for TokenManager<C> {
    async fn access_token(&self) -> GatewayResult<String> {
        self.ensure_valid_token().await
    }

    async fn refresh_access_token(&self) -> GatewayResult<String> {
        self.refresh_token().await?;
        self.get_token()
            .ok_or_else(|| GatewayError::missing_token("Token was cleared during refresh"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use devicegate_common::time::MockClock;
    use devicegate_core::{TokenManagerConfig, TokenRefresher};
    use devicegate_domain::{ErrorCode, RefreshedToken};

    use super::*;

    struct StaticRefresher;

    #[async_trait]
    impl TokenRefresher for StaticRefresher {
        async fn refresh(&self, _refresh_token: &str) -> GatewayResult<RefreshedToken> {
            Ok(RefreshedToken {
                token: "fresh".into(),
                expires_in: Some(3600),
                refresh_token: None,
                scopes: None,
            })
        }
    }

    fn manager() -> TokenManager<MockClock> {
        TokenManager::with_clock(
            Arc::new(StaticRefresher),
            TokenManagerConfig::default(),
            Arc::new(MockClock::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_manager_provides_tokens() {
        let tokens = manager();
        tokens.set_token("initial", Some(3600), Some("r-1".into()), None);

        assert_eq!(tokens.access_token().await.unwrap(), "initial");
        assert_eq!(tokens.refresh_access_token().await.unwrap(), "fresh");
        assert_eq!(tokens.access_token().await.unwrap(), "fresh");

        tokens.clear_token();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let err = tokens.access_token().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthMissingToken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_without_refresh_token_fails() {
        let tokens = manager();
        tokens.set_token("initial", Some(3600), None, None);

        let err = tokens.refresh_access_token().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthMissingToken);
    }
}
