//! KUDO client
//!
//! Repository access goes through [`RepositoryClient`]; cluster writes use
//! the typed KUDO resources from the `crds` crate.

use crate::backend_trait::PackageBackend;
use crate::error::KudoError;
use crate::models::{InstallOptions, InstallTarget, PackageArtifact, PackageRef};
use crate::repository::RepositoryClient;
use crds::{
    Instance, InstanceSpec, OPERATOR_LABEL, Operator, OperatorVersion, OperatorVersionReference,
};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

/// KUDO package backend on a Kubernetes cluster
#[derive(Clone)]
pub struct KudoClient {
    client: Client,
    repository: RepositoryClient,
}

impl KudoClient {
    pub fn new(client: Client) -> Result<Self, KudoError> {
        Ok(Self {
            client,
            repository: RepositoryClient::new()?,
        })
    }

    /// Use the OperatorVersion already installed in `namespace`
    async fn resolve_in_cluster(
        &self,
        package: &PackageRef,
        namespace: &str,
    ) -> Result<PackageArtifact, KudoError> {
        let operators: Api<Operator> = Api::namespaced(self.client.clone(), namespace);
        let operator = operators.get_opt(&package.name).await?.ok_or_else(|| {
            KudoError::NotFound(format!("Operator {}/{}", namespace, package.name))
        })?;

        let versions: Api<OperatorVersion> = Api::namespaced(self.client.clone(), namespace);
        let installed = versions.list(&ListParams::default()).await?.items;
        let operator_version = select_installed(installed, package).ok_or_else(|| {
            KudoError::PackageNotFound(format!("{} in namespace {}", package.name, namespace))
        })?;

        Ok(PackageArtifact {
            operator,
            operator_version,
        })
    }
}

/// Highest installed OperatorVersion of `package` matching its version filters
pub fn select_installed(
    installed: Vec<OperatorVersion>,
    package: &PackageRef,
) -> Option<OperatorVersion> {
    installed
        .into_iter()
        .filter(|ov| ov.spec.operator.name == package.name)
        .filter(|ov| {
            package
                .operator_version
                .as_deref()
                .is_none_or(|wanted| ov.spec.version == wanted)
        })
        .filter(|ov| {
            package
                .app_version
                .as_deref()
                .is_none_or(|wanted| ov.spec.app_version == wanted)
        })
        .max_by_key(|ov| semver::Version::parse(ov.spec.version.trim_start_matches('v')).ok())
}

/// Instance object for `artifact` bound to `target`
pub fn build_instance(
    artifact: &PackageArtifact,
    target: &InstallTarget,
    parameters: &BTreeMap<String, String>,
) -> Instance {
    let mut instance = Instance::new(
        &target.name,
        InstanceSpec {
            operator_version: OperatorVersionReference {
                name: artifact.operator_version_name(),
            },
            parameters: parameters.clone(),
            plan_execution: None,
        },
    );
    instance.metadata.namespace = Some(target.namespace.clone());
    instance.metadata.labels = Some(BTreeMap::from([(
        OPERATOR_LABEL.to_string(),
        artifact.operator_name(),
    )]));
    instance.metadata.owner_references = target.owner.clone().map(|owner| vec![owner]);
    instance
}

/// Returns whether the object was created; an existing one counts as success
async fn create_if_absent<K>(api: &Api<K>, object: &K) -> Result<bool, KudoError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), object).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl PackageBackend for KudoClient {
    async fn resolve(&self, package: &PackageRef, namespace: &str) -> Result<PackageArtifact, KudoError> {
        if package.in_cluster {
            debug!(package = %package.name, namespace, "Resolving in-cluster operator");
            return self.resolve_in_cluster(package, namespace).await;
        }
        self.repository.resolve(package).await
    }

    async fn install(
        &self,
        artifact: &PackageArtifact,
        target: &InstallTarget,
        parameters: &BTreeMap<String, String>,
        options: InstallOptions,
    ) -> Result<(), KudoError> {
        let namespace = target.namespace.as_str();

        let mut operator = artifact.operator.clone();
        operator.metadata.namespace = Some(namespace.to_string());
        let operators: Api<Operator> = Api::namespaced(self.client.clone(), namespace);
        if create_if_absent(&operators, &operator).await? {
            info!("Created Operator {}/{}", namespace, artifact.operator_name());
        }

        let mut operator_version = artifact.operator_version.clone();
        operator_version.metadata.namespace = Some(namespace.to_string());
        let versions: Api<OperatorVersion> = Api::namespaced(self.client.clone(), namespace);
        if create_if_absent(&versions, &operator_version).await? {
            info!("Created OperatorVersion {}/{}", namespace, artifact.operator_version_name());
        }

        if options.skip_instance {
            return Ok(());
        }

        let instance = build_instance(artifact, target, parameters);
        let instances: Api<Instance> = Api::namespaced(self.client.clone(), namespace);
        if !create_if_absent(&instances, &instance).await? {
            return Err(KudoError::InstanceExists(format!("{}/{}", namespace, target.name)));
        }
        info!("Created Instance {}/{}", namespace, target.name);
        Ok(())
    }

    async fn get_instance(&self, namespace: &str, name: &str) -> Result<Option<Instance>, KudoError> {
        let instances: Api<Instance> = Api::namespaced(self.client.clone(), namespace);
        Ok(instances.get_opt(name).await?)
    }

    async fn get_operator_version(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OperatorVersion>, KudoError> {
        let versions: Api<OperatorVersion> = Api::namespaced(self.client.clone(), namespace);
        Ok(versions.get_opt(name).await?)
    }

    async fn update_instance_parameters(
        &self,
        namespace: &str,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), KudoError> {
        let instances: Api<Instance> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "spec": { "parameters": parameters } });
        instances
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn upgrade(
        &self,
        namespace: &str,
        name: &str,
        operator_version: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), KudoError> {
        let instances: Api<Instance> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "spec": {
                "operatorVersion": { "name": operator_version },
                "parameters": parameters,
            }
        });
        instances
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("Upgraded Instance {}/{} to {}", namespace, name, operator_version);
        Ok(())
    }
}
