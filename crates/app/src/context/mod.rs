//! Application context - dependency injection container

use std::sync::Arc;

use devicegate_core::{TaskManager, TaskManagerConfig, TokenManager, TokenManagerConfig};
use devicegate_domain::{Config, GatewayResult, TokenState};
use devicegate_infra::{
    config, ApiClient, ApiClientConfig, ApiClientFactory, ApiTokenRefresher, HttpClient,
};
use tracing::{info, warn};

use crate::utils::health::{ComponentHealth, HealthStatus};

/// Holds every long-lived service of the gateway
///
/// Tool handlers receive a reference to the context and reach the remote
/// API, the token and the task table through it.
pub struct AppContext {
    pub config: Config,
    pub token_manager: TokenManager,
    pub task_manager: TaskManager,
    api_factory: ApiClientFactory,
    api: Arc<ApiClient>,
}

impl AppContext {
    /// Create the context from the probed config file and environment
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn new() -> GatewayResult<Self> {
        Self::new_with_config(config::load()?).await
    }

    /// Create the context from an explicit configuration
    ///
    /// Seeds the token from `auth.bootstrap_token` and starts the task sweep.
    /// A missing bootstrap token is not an error; API calls fail with
    /// `AUTH_MISSING_TOKEN` until one is set.
    pub async fn new_with_config(config: Config) -> GatewayResult<Self> {
        config.validate()?;
        let base_url = config.server.base_url();

        let refresh_http =
            HttpClient::builder().timeout(config.server.request_timeout()).build()?;
        let refresher = ApiTokenRefresher::new(refresh_http, &base_url);
        let token_manager =
            TokenManager::new(Arc::new(refresher), TokenManagerConfig::from(&config.auth));
        token_manager.initialize_token(&config.auth);

        let task_manager = TaskManager::new(TaskManagerConfig::from(&config.tasks));
        task_manager.start_cleanup();

        let api_factory = ApiClientFactory::new();
        let api =
            api_factory.create(ApiClientConfig::from(&config), Arc::new(token_manager.clone()))?;

        info!(
            base_url = %base_url,
            circuit_breaker = config.circuit_breaker.enabled,
            max_concurrent_tasks = config.tasks.max_concurrent_tasks,
            "Application context initialized"
        );

        Ok(Self { config, token_manager, task_manager, api_factory, api })
    }

    /// The shared API client
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// The factory that created [`api`](Self::api); it refuses a second client
    pub fn api_factory(&self) -> &ApiClientFactory {
        &self.api_factory
    }

    /// Probe the remote API and report on every component
    pub async fn health_check(&self) -> HealthStatus {
        let remote = if self.api().test_connection().await {
            ComponentHealth::healthy("remote_api")
        } else {
            ComponentHealth::unhealthy("remote_api", "health endpoint unreachable")
        };

        let token = match self.token_manager.state() {
            TokenState::Valid => ComponentHealth::healthy("auth_token"),
            TokenState::ExpiringSoon => {
                ComponentHealth::healthy("auth_token").with_message("expiring soon")
            }
            TokenState::Expired => ComponentHealth::unhealthy("auth_token", "token expired"),
            TokenState::NoToken => ComponentHealth::unhealthy("auth_token", "no token set"),
        };

        let stats = self.task_manager.stats();
        let tasks = ComponentHealth::healthy("task_manager")
            .with_message(format!("{} active of {} tracked", stats.active(), stats.total));

        let mut status =
            HealthStatus::new().add_component(remote).add_component(token).add_component(tasks);
        status.calculate_score();
        status
    }

    /// Stop background work
    ///
    /// Cancels every non-terminal task, stops the sweep and drops the token
    /// along with its refresh timer.
    pub fn shutdown(&self) {
        let cancelled = self.task_manager.shutdown();
        if cancelled > 0 {
            warn!(cancelled, "Cancelled in-flight tasks during shutdown");
        }
        self.token_manager.clear_token();
        info!("Application context shut down");
    }
}
