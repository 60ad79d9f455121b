//! KUDO repository and installation models

use crds::{KudoOperator, Operator, OperatorVersion};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Repository used when a bridge does not name one
pub const DEFAULT_REPOSITORY_URL: &str = "https://kudo-repository.storage.googleapis.com/0.10.0";

/// Repository `index.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<PackageVersion>>,
}

/// One released version of a package in the index
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub name: String,
    #[serde(alias = "version")]
    pub operator_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// What to resolve
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageRef {
    pub name: String,
    /// Repository base URL; empty selects [`DEFAULT_REPOSITORY_URL`]
    pub repository: String,
    pub operator_version: Option<String>,
    pub app_version: Option<String>,
    /// Take the OperatorVersion already installed in the target namespace
    pub in_cluster: bool,
}

impl PackageRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_operator_version(mut self, version: impl Into<String>) -> Self {
        self.operator_version = Some(version.into());
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    /// Repository base URL without a trailing slash
    pub fn repository_url(&self) -> &str {
        if self.repository.is_empty() {
            DEFAULT_REPOSITORY_URL
        } else {
            self.repository.trim_end_matches('/')
        }
    }
}

impl From<&KudoOperator> for PackageRef {
    fn from(operator: &KudoOperator) -> Self {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        Self {
            name: operator.package.clone(),
            repository: operator.repository.clone(),
            operator_version: non_empty(operator.version.as_str()),
            app_version: non_empty(operator.app_version.as_str()),
            in_cluster: operator.in_cluster_operator,
        }
    }
}

/// Resources of a resolved package, not yet bound to a namespace
#[derive(Debug, Clone)]
pub struct PackageArtifact {
    pub operator: Operator,
    pub operator_version: OperatorVersion,
}

impl PackageArtifact {
    pub fn operator_name(&self) -> String {
        self.operator.metadata.name.clone().unwrap_or_default()
    }

    pub fn operator_version_name(&self) -> String {
        self.operator_version.metadata.name.clone().unwrap_or_default()
    }

    /// Declared operator version, e.g. `1.3.1`
    pub fn version(&self) -> &str {
        &self.operator_version.spec.version
    }

    /// Names of the parameters the package declares
    pub fn parameter_names(&self) -> Vec<String> {
        self.operator_version
            .spec
            .parameters
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }
}

/// Where to install and who owns the Instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstallTarget {
    pub namespace: String,
    /// Instance name
    pub name: String,
    pub owner: Option<OwnerReference>,
}

impl InstallTarget {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstallOptions {
    /// Install Operator and OperatorVersion only
    pub skip_instance: bool,
}
