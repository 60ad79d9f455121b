//! Mock PackageBackend for unit testing
//!
//! Packages are registered up front; installs, parameter updates and
//! upgrades act on in-memory Instances and OperatorVersions and every call is
//! recorded for assertions.

use crate::backend_trait::PackageBackend;
use crate::client::{build_instance, select_installed};
use crate::error::KudoError;
use crate::models::{InstallOptions, InstallTarget, PackageArtifact, PackageRef};
use crds::{Instance, OperatorVersion};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Resolve(PackageRef),
    Install {
        operator_version: String,
        target: String,
        parameters: BTreeMap<String, String>,
        skip_instance: bool,
    },
    UpdateParameters {
        instance: String,
        parameters: BTreeMap<String, String>,
    },
    Upgrade {
        instance: String,
        operator_version: String,
        parameters: BTreeMap<String, String>,
    },
}

type Key = (String, String);

#[derive(Clone, Default)]
pub struct MockPackageBackend {
    packages: Arc<Mutex<Vec<PackageArtifact>>>,
    operator_versions: Arc<Mutex<BTreeMap<Key, OperatorVersion>>>,
    instances: Arc<Mutex<BTreeMap<Key, Instance>>>,
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl MockPackageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a package resolvable
    pub fn add_package(&self, artifact: PackageArtifact) {
        self.packages.lock().unwrap().push(artifact);
    }

    /// Seed an installed OperatorVersion
    pub fn add_operator_version(&self, namespace: &str, operator_version: OperatorVersion) {
        let name = operator_version.metadata.name.clone().unwrap_or_default();
        self.operator_versions
            .lock()
            .unwrap()
            .insert(key(namespace, &name), operator_version);
    }

    /// Seed an existing Instance
    pub fn add_instance(&self, namespace: &str, instance: Instance) {
        let name = instance.metadata.name.clone().unwrap_or_default();
        self.instances.lock().unwrap().insert(key(namespace, &name), instance);
    }

    pub fn instance(&self, namespace: &str, name: &str) -> Option<Instance> {
        self.instances.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change cluster state
    pub fn mutating_calls(&self) -> Vec<BackendCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, BackendCall::Resolve(_)))
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl PackageBackend for MockPackageBackend {
    async fn resolve(&self, package: &PackageRef, _namespace: &str) -> Result<PackageArtifact, KudoError> {
        self.record(BackendCall::Resolve(package.clone()));
        let packages = self.packages.lock().unwrap();
        let versions = packages
            .iter()
            .map(|artifact| artifact.operator_version.clone())
            .collect();
        let chosen = select_installed(versions, package)
            .ok_or_else(|| KudoError::PackageNotFound(package.name.clone()))?;
        packages
            .iter()
            .find(|artifact| artifact.operator_version.metadata.name == chosen.metadata.name)
            .cloned()
            .ok_or_else(|| KudoError::PackageNotFound(package.name.clone()))
    }

    async fn install(
        &self,
        artifact: &PackageArtifact,
        target: &InstallTarget,
        parameters: &BTreeMap<String, String>,
        options: InstallOptions,
    ) -> Result<(), KudoError> {
        self.record(BackendCall::Install {
            operator_version: artifact.operator_version_name(),
            target: target.name.clone(),
            parameters: parameters.clone(),
            skip_instance: options.skip_instance,
        });
        self.operator_versions
            .lock()
            .unwrap()
            .entry(key(&target.namespace, &artifact.operator_version_name()))
            .or_insert_with(|| artifact.operator_version.clone());

        if options.skip_instance {
            return Ok(());
        }
        let mut instances = self.instances.lock().unwrap();
        let instance_key = key(&target.namespace, &target.name);
        if instances.contains_key(&instance_key) {
            return Err(KudoError::InstanceExists(target.name.clone()));
        }
        instances.insert(instance_key, build_instance(artifact, target, parameters));
        Ok(())
    }

    async fn get_instance(&self, namespace: &str, name: &str) -> Result<Option<Instance>, KudoError> {
        Ok(self.instance(namespace, name))
    }

    async fn get_operator_version(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OperatorVersion>, KudoError> {
        Ok(self
            .operator_versions
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn update_instance_parameters(
        &self,
        namespace: &str,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), KudoError> {
        self.record(BackendCall::UpdateParameters {
            instance: name.to_string(),
            parameters: parameters.clone(),
        });
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(&key(namespace, name))
            .ok_or_else(|| KudoError::NotFound(format!("Instance {namespace}/{name}")))?;
        instance.spec.parameters.extend(parameters.clone());
        Ok(())
    }

    async fn upgrade(
        &self,
        namespace: &str,
        name: &str,
        operator_version: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), KudoError> {
        self.record(BackendCall::Upgrade {
            instance: name.to_string(),
            operator_version: operator_version.to_string(),
            parameters: parameters.clone(),
        });
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(&key(namespace, name))
            .ok_or_else(|| KudoError::NotFound(format!("Instance {namespace}/{name}")))?;
        instance.spec.operator_version.name = operator_version.to_string();
        instance.spec.parameters.extend(parameters.clone());
        Ok(())
    }
}
