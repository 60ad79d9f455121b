//! Reconciliation logic for bridged custom resources.
//!
//! Each observed resource maps to one KUDO Instance of the same name. The
//! BridgeInstance bridging the kind names the operator package and the
//! template used to extract Instance parameters from the resource.

use crate::error::ControllerError;
use crate::params::extract_parameters;
use async_trait::async_trait;
use bridge_runtime::cluster::list_typed;
use bridge_runtime::{ClusterApi, ObjectKey, Reconcile};
use crds::{BridgeInstance, Instance, OperatorVersion, label_selector};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Resource, ResourceExt};
use kudo_client::{InstallOptions, InstallTarget, KudoError, PackageBackend, PackageRef};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const SKIP_INSTANCE: InstallOptions = InstallOptions { skip_instance: true };
const WITH_INSTANCE: InstallOptions = InstallOptions { skip_instance: false };

/// Reconciles resources of one bridged kind into KUDO Instances.
pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    backend: Arc<dyn PackageBackend>,
    resource: ApiResource,
    gvk: GroupVersionKind,
}

impl Reconciler {
    /// Creates a new reconciler for the kind served as `resource`.
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        backend: Arc<dyn PackageBackend>,
        resource: ApiResource,
    ) -> Self {
        let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
        Self {
            cluster,
            backend,
            resource,
            gvk,
        }
    }

    /// Installs, updates or upgrades the Instance backing `object`.
    pub async fn reconcile_object(&self, object: &DynamicObject) -> Result<(), ControllerError> {
        let key = ObjectKey::from_resource(object);
        let namespace = object.namespace().ok_or_else(|| {
            ControllerError::InvalidResource(format!("{} {} has no namespace", self.gvk.kind, key))
        })?;
        let name = object.name_any();

        let bridge = self.find_bridge(&namespace).await?;
        let package = PackageRef::from(&bridge.spec.kudo_operator);
        let observed = serde_json::to_value(object)?;

        match self.backend.get_instance(&namespace, &name).await? {
            None => {
                self.install(&key, object, &bridge, &package, &observed)
                    .await
            }
            Some(instance) => {
                self.update_or_upgrade(&key, &instance, &bridge, &package, &observed)
                    .await
            }
        }
    }

    /// The single BridgeInstance bridging this kind in `namespace`
    async fn find_bridge(&self, namespace: &str) -> Result<BridgeInstance, ControllerError> {
        let selector = label_selector(&self.gvk);
        let mut bridges: Vec<BridgeInstance> =
            list_typed(self.cluster.as_ref(), Some(namespace), &selector).await?;
        if bridges.len() != 1 {
            return Err(ControllerError::BridgeLookup {
                namespace: namespace.to_string(),
                selector,
                found: bridges.len(),
            });
        }
        Ok(bridges.remove(0))
    }

    async fn install(
        &self,
        key: &ObjectKey,
        object: &DynamicObject,
        bridge: &BridgeInstance,
        package: &PackageRef,
        observed: &Value,
    ) -> Result<(), ControllerError> {
        let namespace = key.namespace.clone().unwrap_or_default();
        let target = InstallTarget::new(&namespace, &key.name);

        let artifact = self.backend.resolve(package, &namespace).await?;
        self.backend
            .install(&artifact, &target, &BTreeMap::new(), SKIP_INSTANCE)
            .await?;

        let parameters = self.parameters_for(bridge, observed, &artifact.operator_version);
        let owner = object.controller_owner_ref(&self.resource).ok_or_else(|| {
            ControllerError::InvalidResource(format!("{} {} has no uid", self.gvk.kind, key))
        })?;
        self.backend
            .install(&artifact, &target.with_owner(owner), &parameters, WITH_INSTANCE)
            .await?;

        info!(
            %key,
            operator_version = %artifact.operator_version_name(),
            parameters = parameters.len(),
            "Installed KUDO Instance"
        );
        Ok(())
    }

    async fn update_or_upgrade(
        &self,
        key: &ObjectKey,
        instance: &Instance,
        bridge: &BridgeInstance,
        package: &PackageRef,
        observed: &Value,
    ) -> Result<(), ControllerError> {
        let namespace = key.namespace.clone().unwrap_or_default();
        let name = &key.name;
        let current_name = &instance.spec.operator_version.name;
        let current = self
            .backend
            .get_operator_version(&namespace, current_name)
            .await?
            .ok_or_else(|| {
                KudoError::NotFound(format!("OperatorVersion {namespace}/{current_name}"))
            })?;

        let declared = bridge.spec.kudo_operator.version.as_str();
        if declared.is_empty() || same_version(&current.spec.version, declared)? {
            let parameters = self.parameters_for(bridge, observed, &current);
            // KUDO merges parameter updates into the Instance, so keys the
            // template does not name (defaults, manual edits) stay put. Only
            // the extracted keys are compared; a full set comparison would
            // never settle while such keys exist.
            let changed = parameters
                .iter()
                .any(|(name, value)| instance.spec.parameters.get(name) != Some(value));
            if !changed {
                debug!(%key, "Instance parameters up to date");
                return Ok(());
            }
            self.backend
                .update_instance_parameters(&namespace, name, &parameters)
                .await?;
            info!(%key, parameters = parameters.len(), "Updated KUDO Instance parameters");
            return Ok(());
        }

        let artifact = self.backend.resolve(package, &namespace).await?;
        let target = InstallTarget::new(&namespace, name);
        self.backend
            .install(&artifact, &target, &BTreeMap::new(), SKIP_INSTANCE)
            .await?;
        let parameters = self.parameters_for(bridge, observed, &artifact.operator_version);
        let operator_version = artifact.operator_version_name();
        self.backend
            .upgrade(&namespace, name, &operator_version, &parameters)
            .await?;
        info!(
            %key,
            from = %current.spec.version,
            to = %artifact.version(),
            "Upgraded KUDO Instance"
        );
        Ok(())
    }

    fn parameters_for(
        &self,
        bridge: &BridgeInstance,
        observed: &Value,
        operator_version: &OperatorVersion,
    ) -> BTreeMap<String, String> {
        extract_parameters(
            &bridge.spec.crd_spec,
            observed,
            &operator_version.spec.parameter_names(),
        )
    }
}

/// Parses a version the way operator packages write it: an optional leading
/// `v`, with missing minor and patch components read as zero.
fn parse_version(version: &str) -> Result<semver::Version, ControllerError> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let (core, suffix) = trimmed.split_at(trimmed.find(['-', '+']).unwrap_or(trimmed.len()));
    let padding = match core.split('.').count() {
        1 => ".0.0",
        2 => ".0",
        _ => "",
    };
    semver::Version::parse(&format!("{core}{padding}{suffix}")).map_err(|source| {
        ControllerError::InvalidVersion {
            version: version.to_string(),
            source,
        }
    })
}

/// Semantic equality of two operator versions, so `1.3` equals `v1.3.0`
pub fn same_version(current: &str, declared: &str) -> Result<bool, ControllerError> {
    Ok(parse_version(current)? == parse_version(declared)?)
}

#[async_trait]
impl Reconcile<DynamicObject> for Reconciler {
    type Error = ControllerError;

    async fn reconcile(
        &self,
        key: &ObjectKey,
        object: Option<Arc<DynamicObject>>,
    ) -> Result<(), Self::Error> {
        match object {
            Some(object) => self.reconcile_object(&object).await,
            None => {
                debug!(%key, kind = %self.gvk.kind, "Resource is gone, its Instance is garbage collected");
                Ok(())
            }
        }
    }
}
