//! Main controller implementation.
//!
//! Resolves the watched kind once at startup, then runs a [`ReconcileLoop`]
//! over `DynamicObject`s of that kind.

use crate::config::WatcherConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use bridge_runtime::{ClusterApi, DroppedKey, KubeClusterApi, ReconcileLoop};
use kube::api::DynamicObject;
use kube::{Api, Client};
use kudo_client::KudoClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main controller for one bridged kind.
pub struct Controller {
    api: Api<DynamicObject>,
    reconcile_loop: ReconcileLoop<DynamicObject, Reconciler>,
    dropped: mpsc::UnboundedReceiver<DroppedKey<ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    ///
    /// Fails when the cluster does not serve the configured kind.
    pub async fn new(config: WatcherConfig) -> Result<Self, ControllerError> {
        info!(kind = %config.gvk.kind, "Initializing CRD watcher");

        let client = Client::try_default().await?;
        let cluster = Arc::new(KubeClusterApi::new(client.clone()));
        let resource = cluster.resolve_gvk(&config.gvk).await?;
        info!(plural = %resource.plural, "Resolved {}/{}", resource.api_version, resource.kind);

        let api: Api<DynamicObject> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced_with(client.clone(), ns, &resource),
            None => Api::all_with(client.clone(), &resource),
        };

        let backend = Arc::new(KudoClient::new(client)?);
        let reconciler = Arc::new(Reconciler::new(cluster, backend, resource.clone()));
        let (sink, dropped) = mpsc::unbounded_channel();
        let reconcile_loop = ReconcileLoop::new(
            resource.kind.to_lowercase(),
            reconciler,
            resource,
            config.loop_config,
            sink,
        );

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
        info!("CRD watcher stopped");
        Ok(())
    }
}

async fn report_dropped(mut dropped: mpsc::UnboundedReceiver<DroppedKey<ControllerError>>) {
    while let Some(DroppedKey { key, error, attempts }) = dropped.recv().await {
        error!(
            %key,
            attempts,
            category = error.category(),
            "Dropping resource out of the queue: {}",
            error
        );
    }
}
