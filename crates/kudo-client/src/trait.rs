//! PackageBackend trait for mocking
//!
//! The concrete KudoClient implements this trait, and tests can use
//! MockPackageBackend instead.

use crate::error::KudoError;
use crate::models::{InstallOptions, InstallTarget, PackageArtifact, PackageRef};
use crds::{Instance, OperatorVersion};
use std::collections::BTreeMap;

/// Operations the operator instance reconciler needs from KUDO
#[async_trait::async_trait]
pub trait PackageBackend: Send + Sync {
    /// Resolve a package to its resources. `namespace` is where in-cluster
    /// operators are looked up.
    async fn resolve(&self, package: &PackageRef, namespace: &str) -> Result<PackageArtifact, KudoError>;

    /// Create Operator and OperatorVersion if absent and, unless
    /// `options.skip_instance`, the Instance
    async fn install(
        &self,
        artifact: &PackageArtifact,
        target: &InstallTarget,
        parameters: &BTreeMap<String, String>,
        options: InstallOptions,
    ) -> Result<(), KudoError>;

    async fn get_instance(&self, namespace: &str, name: &str) -> Result<Option<Instance>, KudoError>;

    async fn get_operator_version(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OperatorVersion>, KudoError>;

    /// Merge `parameters` into the Instance
    async fn update_instance_parameters(
        &self,
        namespace: &str,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), KudoError>;

    /// Point the Instance at another OperatorVersion, merging `parameters`
    async fn upgrade(
        &self,
        namespace: &str,
        name: &str,
        operator_version: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), KudoError>;
}
