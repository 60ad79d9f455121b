//! OperatorVersion: templates, plans and parameters of one operator release

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default)]
#[kube(
    group = "kudo.dev",
    version = "v1beta1",
    kind = "OperatorVersion",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorVersionSpec {
    #[serde(default)]
    pub operator: OperatorReference,

    /// Operator release version (semver)
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,

    /// Template file name to content
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub templates: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plans: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OperatorReference {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A declared operator parameter
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Plan triggered when the parameter changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,
}

impl OperatorVersionSpec {
    /// Names of all declared parameters
    #[must_use]
    pub fn parameter_names(&self) -> BTreeSet<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Object name KUDO uses for an operator release.
#[must_use]
pub fn operator_version_name(operator: &str, app_version: &str, version: &str) -> String {
    if app_version.is_empty() {
        format!("{operator}-{version}")
    } else {
        format!("{operator}-{app_version}-{version}")
    }
}
