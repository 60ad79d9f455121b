//! BridgeInstance CRD
//!
//! Binds a user-defined custom resource kind to a KUDO operator package. The
//! `crdSpec` template names the watched kind through its `apiVersion` and
//! `kind` fields; the rest of the template is free-form.

use crate::error::CrdError;
use kube::api::GroupVersionKind;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Finalizer held by every BridgeInstance until its cluster-scoped companions are gone
pub const BRIDGE_FINALIZER: &str = "finalizer.bridge.kudo.dev";

/// Label key holding the watched group
pub const GROUP_LABEL: &str = "group";

/// Label key holding the watched version
pub const VERSION_LABEL: &str = "version";

/// Label key holding the watched kind
pub const KIND_LABEL: &str = "kind";

/// Label attached to the per-bridge controller Deployment and its pods
pub const BRIDGE_APP_LABEL: &str = "kudobridge.dev";

/// Labels attached to cluster-scoped companions so they can be traced back
pub const CRD_KIND_LABEL: &str = "kudobridge.dev/CRDKind";
pub const OWNER_NAME_LABEL: &str = "kudobridge.dev/name";
pub const OWNER_NAMESPACE_LABEL: &str = "kudobridge.dev/namespace";

/// Status value written once all companions exist
pub const STATUS_READY: &str = "Ready";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kudobridge.dev",
    version = "v1alpha1",
    kind = "BridgeInstance",
    namespaced,
    status = "BridgeInstanceStatus",
    shortname = "bi"
)]
#[serde(rename_all = "camelCase")]
pub struct BridgeInstanceSpec {
    /// KUDO operator backing the watched kind
    #[serde(default)]
    pub kudo_operator: KudoOperator,

    /// Template of the watched custom resource
    #[serde(default)]
    #[schemars(schema_with = "crate::schema::preserve_unknown_object")]
    pub crd_spec: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KudoOperator {
    /// Package name in the repository index
    #[serde(default)]
    pub package: String,

    /// Repository base URL; empty selects the default community repository
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,

    /// Operator already installed in the cluster, do not resolve it from a repository
    #[serde(default)]
    pub in_cluster_operator: bool,

    /// Operator version; empty selects the newest
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Application version; empty selects any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct BridgeInstanceStatus {
    /// Lifecycle state, `Ready` once the per-kind controller is deployed
    #[serde(
        rename = "bridgeInstanceStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,
}

impl BridgeInstance {
    /// Group/version/kind of the resources this bridge watches.
    ///
    /// # Errors
    ///
    /// Fails when `crdSpec` lacks `apiVersion` or `kind`, or the apiVersion
    /// is malformed.
    pub fn target_gvk(&self) -> Result<GroupVersionKind, CrdError> {
        let api_version = template_field(&self.spec.crd_spec, "apiVersion")?;
        let kind = template_field(&self.spec.crd_spec, "kind")?;
        let (group, version) = split_api_version(api_version)?;
        Ok(GroupVersionKind::gvk(group, version, kind))
    }

    /// Labels identifying the watched kind, as queried by the per-kind controller
    ///
    /// # Errors
    ///
    /// Same as [`BridgeInstance::target_gvk`].
    pub fn selector_labels(&self) -> Result<BTreeMap<String, String>, CrdError> {
        Ok(selector_labels(&self.target_gvk()?))
    }

    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == BRIDGE_FINALIZER)
    }

    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Current status state, if any
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.state.as_deref())
    }

    /// Name shared by the cluster-scoped companions of this bridge
    #[must_use]
    pub fn cluster_scoped_name(&self) -> String {
        format!(
            "kudobridge-{}-{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}

fn template_field<'a>(template: &'a Value, field: &'static str) -> Result<&'a str, CrdError> {
    template
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(CrdError::MissingTargetField(field))
}

/// Splits `group/version`; a bare version belongs to the core group.
///
/// # Errors
///
/// Fails on empty input or more than one `/`.
pub fn split_api_version(api_version: &str) -> Result<(&str, &str), CrdError> {
    match api_version.split_once('/') {
        Some((group, version)) if !group.is_empty() && !version.is_empty() && !version.contains('/') => {
            Ok((group, version))
        }
        None if !api_version.is_empty() => Ok(("", api_version)),
        _ => Err(CrdError::InvalidApiVersion(api_version.to_string())),
    }
}

/// `group`/`version`/`kind` labels for a watched kind
#[must_use]
pub fn selector_labels(gvk: &GroupVersionKind) -> BTreeMap<String, String> {
    BTreeMap::from([
        (GROUP_LABEL.to_string(), gvk.group.clone()),
        (VERSION_LABEL.to_string(), gvk.version.clone()),
        (KIND_LABEL.to_string(), gvk.kind.clone()),
    ])
}

/// Label selector matching [`selector_labels`]
#[must_use]
pub fn label_selector(gvk: &GroupVersionKind) -> String {
    format!(
        "{VERSION_LABEL}={},{KIND_LABEL}={},{GROUP_LABEL}={}",
        gvk.version, gvk.kind, gvk.group
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use serde_json::json;

    fn bridge(crd_spec: Value) -> BridgeInstance {
        let mut bridge = BridgeInstance::new(
            "kafka-bridge",
            BridgeInstanceSpec {
                kudo_operator: KudoOperator {
                    package: "kafka".to_string(),
                    ..KudoOperator::default()
                },
                crd_spec,
            },
        );
        bridge.metadata.namespace = Some("default".to_string());
        bridge
    }

    #[test]
    fn test_target_gvk_from_template() {
        let bridge = bridge(json!({"apiVersion": "kafka.example.dev/v1", "kind": "Kafka"}));
        let gvk = bridge.target_gvk().unwrap();
        assert_eq!(gvk.group, "kafka.example.dev");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Kafka");
    }

    #[test]
    fn test_target_gvk_missing_fields() {
        assert_eq!(
            bridge(json!({"kind": "Kafka"})).target_gvk(),
            Err(CrdError::MissingTargetField("apiVersion"))
        );
        assert_eq!(
            bridge(json!({"apiVersion": "a.dev/v1"})).target_gvk(),
            Err(CrdError::MissingTargetField("kind"))
        );
        assert!(bridge(Value::Null).target_gvk().is_err());
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("apps/v1"), Ok(("apps", "v1")));
        assert_eq!(split_api_version("v1"), Ok(("", "v1")));
        assert!(split_api_version("").is_err());
        assert!(split_api_version("a/b/c").is_err());
        assert!(split_api_version("/v1").is_err());
    }

    #[test]
    fn test_label_selector_matches_labels() {
        let gvk = GroupVersionKind::gvk("kafka.example.dev", "v1", "Kafka");
        assert_eq!(label_selector(&gvk), "version=v1,kind=Kafka,group=kafka.example.dev");
        let labels = selector_labels(&gvk);
        assert_eq!(labels.get("group").map(String::as_str), Some("kafka.example.dev"));
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_finalizer_and_deletion() {
        let mut bridge = bridge(json!({}));
        assert!(!bridge.has_finalizer());
        bridge.metadata = ObjectMeta {
            finalizers: Some(vec![BRIDGE_FINALIZER.to_string()]),
            ..bridge.metadata
        };
        assert!(bridge.has_finalizer());
        assert!(!bridge.is_being_deleted());
        assert_eq!(bridge.cluster_scoped_name(), "kudobridge-default-kafka-bridge");
    }

    #[test]
    fn test_status_field_name() {
        let status = BridgeInstanceStatus {
            state: Some(STATUS_READY.to_string()),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"bridgeInstanceStatus": "Ready"})
        );
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: BridgeInstanceSpec = serde_json::from_value(json!({
            "kudoOperator": {"package": "kafka", "inClusterOperator": true, "appVersion": "2.5.0"},
            "crdSpec": {"apiVersion": "a.dev/v1", "kind": "K", "spec": {"x": 1}}
        }))
        .unwrap();
        assert!(spec.kudo_operator.in_cluster_operator);
        assert_eq!(spec.kudo_operator.app_version, "2.5.0");
        assert_eq!(spec.crd_spec["spec"]["x"], 1);
    }
}
