//! Companion resources of a BridgeInstance
//!
//! Every bridge gets a ServiceAccount, a Role and RoleBinding in its own
//! namespace, a ClusterRole and ClusterRoleBinding to read the watched kind,
//! and the Deployment running the CRD watcher. Namespaced companions are
//! owned by the bridge; cluster-scoped ones cannot be and are labelled
//! instead, then deleted while finalizing.

use crate::error::ControllerError;
use crds::{
    BRIDGE_APP_LABEL, BridgeInstance, CRD_KIND_LABEL, KUDO_GROUP, OWNER_NAME_LABEL,
    OWNER_NAMESPACE_LABEL,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec, ServiceAccount};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::api::GroupVersionKind;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const WATCHER_CONTAINER: &str = "crd-controller";
const READ_VERBS: [&str; 3] = ["get", "watch", "list"];
const WRITE_VERBS: [&str; 7] = ["get", "watch", "list", "create", "update", "patch", "delete"];

/// All companions of one bridge
#[derive(Debug, Clone)]
pub struct Companions {
    /// Identity the watcher pod runs as
    pub service_account: ServiceAccount,
    /// Access to the KUDO objects and bridges of the namespace
    pub role: Role,
    /// Grants `role` to `service_account`
    pub role_binding: RoleBinding,
    /// Access to the watched kind, which may live in any namespace
    pub cluster_role: ClusterRole,
    /// Grants `cluster_role` to `service_account`
    pub cluster_role_binding: ClusterRoleBinding,
    /// Runs the CRD watcher for the target kind
    pub deployment: Deployment,
}

impl Companions {
    pub fn for_bridge(
        bridge: &BridgeInstance,
        gvk: &GroupVersionKind,
        watcher_image: &str,
    ) -> Result<Self, ControllerError> {
        let owner = bridge.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::InvalidResource(format!(
                "BridgeInstance {} has no uid",
                bridge.name_any()
            ))
        })?;
        let namespace = bridge.namespace().ok_or_else(|| {
            ControllerError::InvalidResource(format!(
                "BridgeInstance {} has no namespace",
                bridge.name_any()
            ))
        })?;
        let name = bridge.name_any();
        let cluster_name = bridge.cluster_scoped_name();
        let subject = Subject {
            kind: "ServiceAccount".to_string(),
            name: name.clone(),
            namespace: Some(namespace.clone()),
            ..Default::default()
        };

        Ok(Self {
            service_account: ServiceAccount {
                metadata: owned_meta(&name, &namespace, &owner),
                ..Default::default()
            },
            role: Role {
                metadata: owned_meta(&name, &namespace, &owner),
                rules: Some(vec![
                    rule(&BridgeInstance::group(&()), &["bridgeinstances"], &READ_VERBS),
                    rule(KUDO_GROUP, &["operatorversions", "instances", "operators"], &WRITE_VERBS),
                ]),
            },
            role_binding: RoleBinding {
                metadata: owned_meta(&name, &namespace, &owner),
                role_ref: role_ref("Role", &name),
                subjects: Some(vec![subject.clone()]),
            },
            cluster_role: ClusterRole {
                metadata: cluster_meta(&cluster_name, bridge, gvk),
                rules: Some(vec![
                    rule(&gvk.group, &["*"], &READ_VERBS),
                    rule("apiextensions.k8s.io", &["customresourcedefinitions"], &READ_VERBS),
                ]),
                ..Default::default()
            },
            cluster_role_binding: ClusterRoleBinding {
                metadata: cluster_meta(&cluster_name, bridge, gvk),
                role_ref: role_ref("ClusterRole", &cluster_name),
                subjects: Some(vec![subject]),
            },
            deployment: watcher_deployment(&name, &namespace, &owner, gvk, watcher_image),
        })
    }
}

fn owned_meta(name: &str, namespace: &str, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

fn cluster_meta(name: &str, bridge: &BridgeInstance, gvk: &GroupVersionKind) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(BTreeMap::from([
            (CRD_KIND_LABEL.to_string(), gvk.kind.clone()),
            (OWNER_NAME_LABEL.to_string(), bridge.name_any()),
            (OWNER_NAMESPACE_LABEL.to_string(), bridge.namespace().unwrap_or_default()),
        ])),
        ..Default::default()
    }
}

fn rule(group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn role_ref(kind: &str, name: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_GROUP.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// `apiVersion` string of the watched kind
pub fn api_version(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

fn watcher_deployment(
    name: &str,
    namespace: &str,
    owner: &OwnerReference,
    gvk: &GroupVersionKind,
    image: &str,
) -> Deployment {
    let labels = BTreeMap::from([(BRIDGE_APP_LABEL.to_string(), name.to_string())]);
    let group_version = api_version(gvk);
    let env = |name: &str, value: &str| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    };

    Deployment {
        metadata: owned_meta(name, namespace, owner),
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(name.to_string()),
                    containers: vec![Container {
                        name: WATCHER_CONTAINER.to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some("Always".to_string()),
                        env: Some(vec![
                            env("GROUP_VERSION", &group_version),
                            env("KIND", &gvk.kind),
                        ]),
                        args: Some(vec![
                            format!("--group-version={group_version}"),
                            format!("--kind={}", gvk.kind),
                            format!("--ns={namespace}"),
                        ]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
