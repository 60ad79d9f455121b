//! KUDO Bridge Controller
//!
//! Watches `BridgeInstance` resources. For each bridge it creates the RBAC
//! objects and the Deployment of a CRD watcher dedicated to the bridged
//! kind, and cleans up cluster-scoped objects when the bridge is deleted.

mod companions;
mod config;
mod controller;
mod error;
mod reconciler;

#[cfg(test)]
mod test_utils;

use bridge_runtime::cancel_on_signal;
use config::BridgeConfig;
use controller::Controller;
use error::ControllerError;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Select the rustls crypto provider before the kube client is built
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting KUDO Bridge Controller");

    let config = BridgeConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  CRD watcher image: {}", config.watcher_image);
    info!("  Max retries: {}", config.loop_config.max_retries);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let controller = Controller::new(config).await?;
    controller.run(cancel).await
}
