//! CRD watcher
//!
//! Runs once per BridgeInstance. Watches the bridged custom resource kind and
//! keeps a KUDO Instance in step with every resource of that kind: installs
//! the operator on first sight, forwards parameter changes, and upgrades the
//! Instance when the bridge declares another operator version.

mod config;
mod controller;
mod error;
mod params;
mod reconciler;

#[cfg(test)]
mod test_utils;

use bridge_runtime::cancel_on_signal;
use clap::Parser;
use config::{Args, WatcherConfig};
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

    // Select the rustls crypto provider before any client is built
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting CRD watcher");

    let config = WatcherConfig::try_from(Args::parse())?;
    info!("Configuration:");
    info!("  Group/Version: {}/{}", config.gvk.group, config.gvk.version);
    info!("  Kind: {}", config.gvk.kind);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Max retries: {}", config.loop_config.max_retries);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let controller = Controller::new(config).await?;
    controller.run(cancel).await
}
