//! Main controller implementation.
//!
//! Wires the BridgeInstance watch to the [`Reconciler`] through a
//! [`ReconcileLoop`] and logs the keys the loop gives up on.

use crate::config::BridgeConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use bridge_runtime::{DroppedKey, KubeClusterApi, ReconcileLoop};
use crds::BridgeInstance;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main controller for BridgeInstance management.
pub struct Controller {
    api: Api<BridgeInstance>,
    reconcile_loop: ReconcileLoop<BridgeInstance, Reconciler>,
    dropped: mpsc::UnboundedReceiver<DroppedKey<ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: BridgeConfig) -> Result<Self, ControllerError> {
        info!("Initializing KUDO Bridge Controller");

        let client = Client::try_default().await?;
        let api: Api<BridgeInstance> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };

        let cluster = Arc::new(KubeClusterApi::new(client));
        let reconciler = Arc::new(Reconciler::new(cluster, config.watcher_image));
        let (sink, dropped) = mpsc::unbounded_channel();
        let reconcile_loop =
            ReconcileLoop::new("bridgeinstance", reconciler, (), config.loop_config, sink);

        Ok(Self {
            api,
            reconcile_loop,
            dropped,
        })
    }

    /// Runs the controller until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ControllerError> {
        let Self {
            api,
            reconcile_loop,
            dropped,
        } = self;

        let reporter = tokio::spawn(report_dropped(dropped));
        let result = reconcile_loop.run_with_api(api, cancel).await;
        reporter.abort();

        result?;
        info!("KUDO Bridge Controller stopped");
        Ok(())
    }
}

async fn report_dropped(mut dropped: mpsc::UnboundedReceiver<DroppedKey<ControllerError>>) {
    while let Some(DroppedKey { key, error, attempts }) = dropped.recv().await {
        error!(
            %key,
            attempts,
            category = error.category(),
            "Dropping BridgeInstance out of the queue: {}",
            error
        );
    }
}
