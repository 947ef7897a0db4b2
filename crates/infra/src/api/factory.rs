//! Create-once holder for the shared [`ApiClient`]

use std::sync::Arc;

use devicegate_common::error::{GatewayError, GatewayResult};
use once_cell::sync::OnceCell;
use tracing::info;

use super::auth::AccessTokenProvider;
use super::client::{ApiClient, ApiClientConfig};

/// Owns the single API client of an application context
///
/// `create` may succeed only once; `instance` fails until it has.
#[derive(Debug, Default)]
pub struct ApiClientFactory {
    instance: OnceCell<Arc<ApiClient>>,
}

impl ApiClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// `SYSTEM_INTERNAL` if a client was already created, or whatever
    /// [`ApiClient::new`] reports.
    pub fn create(
        &self,
        config: ApiClientConfig,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> GatewayResult<Arc<ApiClient>> {
        if self.instance.get().is_some() {
            return Err(already_created());
        }

        let client = Arc::new(ApiClient::new(config, auth)?);
        self.instance.set(Arc::clone(&client)).map_err(|_| already_created())?;
        info!(base_url = client.base_url(), "API client created");
        Ok(client)
    }

    /// The created client
    ///
    /// # Errors
    ///
    /// `SYSTEM_INTERNAL` if [`create`](Self::create) has not been called.
    pub fn instance(&self) -> GatewayResult<Arc<ApiClient>> {
        self.instance.get().cloned().ok_or_else(|| {
            GatewayError::internal("API client not initialized; call create() first")
        })
    }

    pub fn is_created(&self) -> bool {
        self.instance.get().is_some()
    }
}

fn already_created() -> GatewayError {
    GatewayError::internal("API client already created")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use devicegate_common::error::ErrorCode;

    use super::*;

    struct NoAuth;

    #[async_trait]
    impl AccessTokenProvider for NoAuth {
        async fn access_token(&self) -> GatewayResult<String> {
            Err(GatewayError::missing_token("none"))
        }

        async fn refresh_access_token(&self) -> GatewayResult<String> {
            Err(GatewayError::missing_token("none"))
        }
    }

    #[test]
    fn test_instance_before_create_fails() {
        let factory = ApiClientFactory::new();
        let err = factory.instance().unwrap_err();
        assert_eq!(err.code, ErrorCode::SystemInternal);
        assert!(!factory.is_created());
    }

    #[test]
    fn test_create_once() {
        let factory = ApiClientFactory::new();
        let created = factory.create(ApiClientConfig::default(), Arc::new(NoAuth)).unwrap();
        let fetched = factory.instance().unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));

        let err = factory.create(ApiClientConfig::default(), Arc::new(NoAuth)).unwrap_err();
        assert_eq!(err.code, ErrorCode::SystemInternal);
        assert!(Arc::ptr_eq(&factory.instance().unwrap(), &created));
    }
}
