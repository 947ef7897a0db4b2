//! DeviceGate - gateway to a remote device-management API
//!
//! Loads configuration, builds the application context, checks the remote
//! API and runs until interrupted.

use anyhow::Context;
use devicegate_lib::utils::logging;
use devicegate_lib::AppContext;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    let dotenv = dotenvy::dotenv();
    logging::init();
    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "Could not load .env file"),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "DeviceGate starting");

    let config = devicegate_infra::config::load().context("failed to load configuration")?;
    let ctx = AppContext::new_with_config(config)
        .await
        .context("failed to initialize application context")?;

    let health = ctx.health_check().await;
    if health.is_healthy {
        info!(base_url = ctx.api().base_url(), "DeviceGate ready");
    } else {
        for component in health.components.iter().filter(|c| !c.is_healthy) {
            warn!(
                component = %component.name,
                reason = component.message.as_deref().unwrap_or("unknown"),
                "Component unhealthy at startup"
            );
        }
    }

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    ctx.shutdown();
    Ok(())
}
