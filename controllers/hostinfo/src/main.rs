//! HostInfo Controller
//!
//! Keeps `HostInfo` resources in sync with vCenter: for each resource the
//! named ESXi host is looked up in the inventory and its total and free CPU
//! capacity (MHz) are written into status. Resources are resynced
//! periodically so the figures follow live usage.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod store;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting HostInfo Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  vCenter URL: {}", config.vcenter_url);
    info!("  vCenter user: {}", config.vcenter_username);
    info!("  Insecure TLS: {}", config.vcenter_insecure);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Metrics address: {}", config.metrics_addr);
    info!("  Resync interval: {:?}", config.resync_interval);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
