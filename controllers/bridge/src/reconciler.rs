//! Reconciliation logic for BridgeInstance resources.
//!
//! A pass either finalizes a bridge being deleted or converges its companion
//! resources, then records the `Ready` state. Every step is get-or-create, so
//! a second pass over an unchanged bridge performs no writes.

use crate::companions::Companions;
use crate::error::ControllerError;
use async_trait::async_trait;
use bridge_runtime::cluster::{
    delete_typed, ensure_exists, update_status_typed, update_typed,
};
use bridge_runtime::{ClusterApi, ObjectKey, Reconcile};
use crds::{BRIDGE_FINALIZER, BridgeInstance, BridgeInstanceStatus, STATUS_READY};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconciles BridgeInstance resources.
pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    watcher_image: String,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(cluster: Arc<dyn ClusterApi>, watcher_image: impl Into<String>) -> Self {
        Self {
            cluster,
            watcher_image: watcher_image.into(),
        }
    }

    /// Converges one BridgeInstance.
    ///
    /// This method:
    /// 1. Finalizes the bridge when it is being deleted
    /// 2. Checks the watched kind is served by the cluster
    /// 3. Adds the finalizer and selector labels
    /// 4. Creates missing companions
    /// 5. Records the `Ready` state
    pub async fn reconcile_bridge(&self, bridge: &BridgeInstance) -> Result<(), ControllerError> {
        let key = ObjectKey::from_resource(bridge);

        if bridge.is_being_deleted() {
            return self.finalize(&key, bridge).await;
        }

        let gvk = bridge.target_gvk()?;
        self.cluster.resolve_gvk(&gvk).await?;

        let bridge = self.ensure_metadata(&key, bridge).await?;
        let companions = Companions::for_bridge(&bridge, &gvk, &self.watcher_image)?;
        let cluster = self.cluster.as_ref();

        if ensure_exists(cluster, &companions.service_account).await? {
            info!(%key, "Created ServiceAccount");
        }
        if ensure_exists(cluster, &companions.role).await? {
            info!(%key, "Created Role");
        }
        if ensure_exists(cluster, &companions.role_binding).await? {
            info!(%key, "Created RoleBinding");
        }
        if ensure_exists(cluster, &companions.cluster_role).await? {
            info!(%key, name = %bridge.cluster_scoped_name(), "Created ClusterRole");
        }
        if ensure_exists(cluster, &companions.cluster_role_binding).await? {
            info!(%key, name = %bridge.cluster_scoped_name(), "Created ClusterRoleBinding");
        }
        if ensure_exists(cluster, &companions.deployment).await? {
            info!(%key, kind = %gvk.kind, "Created CRD watcher Deployment");
        } else {
            debug!(%key, "Deployment already exists, updates aren't supported yet");
        }

        if bridge.state() != Some(STATUS_READY) {
            let mut ready = bridge.clone();
            ready.status = Some(BridgeInstanceStatus {
                state: Some(STATUS_READY.to_string()),
            });
            update_status_typed(cluster, &ready).await?;
            info!(%key, "BridgeInstance is Ready");
        }

        Ok(())
    }

    /// Add the finalizer and selector labels, writing once when either is missing
    async fn ensure_metadata(
        &self,
        key: &ObjectKey,
        bridge: &BridgeInstance,
    ) -> Result<BridgeInstance, ControllerError> {
        let mut updated = bridge.clone();
        let mut changed = false;

        if !updated.has_finalizer() {
            updated.finalizers_mut().push(BRIDGE_FINALIZER.to_string());
            changed = true;
        }
        let labels = updated.labels_mut();
        for (name, value) in bridge.selector_labels()? {
            if labels.get(&name) != Some(&value) {
                labels.insert(name, value);
                changed = true;
            }
        }

        if !changed {
            return Ok(updated);
        }
        let updated = update_typed(self.cluster.as_ref(), &updated).await?;
        debug!(%key, "Added finalizer and selector labels");
        Ok(updated)
    }

    /// Remove cluster-scoped companions, then release the finalizer
    async fn finalize(&self, key: &ObjectKey, bridge: &BridgeInstance) -> Result<(), ControllerError> {
        if !bridge.has_finalizer() {
            debug!(%key, "BridgeInstance being deleted without finalizer");
            return Ok(());
        }

        let cluster = self.cluster.as_ref();
        let name = bridge.cluster_scoped_name();
        if delete_typed::<ClusterRoleBinding>(cluster, None, &name).await? {
            info!(%key, %name, "Deleted ClusterRoleBinding");
        }
        if delete_typed::<ClusterRole>(cluster, None, &name).await? {
            info!(%key, %name, "Deleted ClusterRole");
        }

        let mut released = bridge.clone();
        released.finalizers_mut().retain(|f| f != BRIDGE_FINALIZER);
        update_typed(cluster, &released).await?;
        info!(%key, "Removed finalizer");
        Ok(())
    }
}

#[async_trait]
impl Reconcile<BridgeInstance> for Reconciler {
    type Error = ControllerError;

    async fn reconcile(
        &self,
        key: &ObjectKey,
        object: Option<Arc<BridgeInstance>>,
    ) -> Result<(), Self::Error> {
        match object {
            Some(bridge) => self.reconcile_bridge(&bridge).await,
            None => {
                debug!(%key, "BridgeInstance is gone, nothing to do");
                Ok(())
            }
        }
    }
}
