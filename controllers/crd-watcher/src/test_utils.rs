//! Test utilities for unit testing the CRD watcher reconciler
//!
//! Builds Kafka resources, a bridge for them, KUDO packages and the mock
//! cluster and package backend the reconciler runs against.

use crate::reconciler::Reconciler;
use bridge_runtime::MockClusterApi;
use crds::{
    BridgeInstance, BridgeInstanceSpec, Instance, InstanceSpec, KudoOperator, Operator,
    OperatorReference, OperatorSpec, OperatorVersion, OperatorVersionReference,
    OperatorVersionSpec, Parameter, operator_version_name, selector_labels,
};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kudo_client::{MockPackageBackend, PackageArtifact};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAMESPACE: &str = "default";

pub fn kafka_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("kafka.example.dev", "v1", "Kafka")
}

pub fn kafka_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&kafka_gvk(), "kafkas")
}

/// Helper to create a bridge for Kafka resources, labelled as the bridge controller leaves it
pub fn create_test_bridge(name: &str, operator_version: &str) -> BridgeInstance {
    let mut bridge = BridgeInstance::new(
        name,
        BridgeInstanceSpec {
            kudo_operator: KudoOperator {
                package: "kafka".to_string(),
                version: operator_version.to_string(),
                ..KudoOperator::default()
            },
            crd_spec: json!({
                "apiVersion": "kafka.example.dev/v1",
                "kind": "Kafka",
                "spec": {
                    "brokers": "BROKER_COUNT",
                    "storage": {"size": "DISK_SIZE"}
                }
            }),
        },
    );
    bridge.metadata.namespace = Some(NAMESPACE.to_string());
    bridge.metadata.labels = Some(selector_labels(&kafka_gvk()));
    bridge
}

/// Helper to create an observed Kafka resource
pub fn create_test_kafka(name: &str, brokers: u32, size: &str) -> DynamicObject {
    let mut kafka = DynamicObject::new(name, &kafka_resource()).within(NAMESPACE);
    kafka.metadata.uid = Some(format!("uid-{name}"));
    kafka.data = json!({"spec": {"brokers": brokers, "storage": {"size": size}}});
    kafka
}

pub fn create_test_operator_version(version: &str) -> OperatorVersion {
    let mut operator_version = OperatorVersion::new(
        &operator_version_name("kafka", "", version),
        OperatorVersionSpec {
            operator: OperatorReference {
                name: "kafka".to_string(),
                kind: Some("Operator".to_string()),
            },
            version: version.to_string(),
            parameters: ["BROKER_COUNT", "DISK_SIZE", "ZOOKEEPER_URI"]
                .iter()
                .map(|name| Parameter {
                    name: name.to_string(),
                    ..Parameter::default()
                })
                .collect(),
            ..OperatorVersionSpec::default()
        },
    );
    operator_version.metadata.namespace = Some(NAMESPACE.to_string());
    operator_version
}

/// Package of the kafka operator at `version`
pub fn create_test_package(version: &str) -> PackageArtifact {
    PackageArtifact {
        operator: Operator::new("kafka", OperatorSpec::default()),
        operator_version: create_test_operator_version(version),
    }
}

/// Existing Instance running `operator_version` with `parameters`
pub fn create_test_instance(name: &str, version: &str, parameters: &[(&str, &str)]) -> Instance {
    let mut instance = Instance::new(
        name,
        InstanceSpec {
            operator_version: OperatorVersionReference {
                name: operator_version_name("kafka", "", version),
            },
            parameters: params(parameters),
            plan_execution: None,
        },
    );
    instance.metadata.namespace = Some(NAMESPACE.to_string());
    instance
}

pub fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Mock cluster holding `bridges` and a package backend offering kafka 1.3.0 and 1.4.0
pub fn setup(bridges: &[BridgeInstance]) -> (MockClusterApi, MockPackageBackend, Reconciler) {
    let cluster = MockClusterApi::new();
    cluster.register(kafka_resource());
    for bridge in bridges {
        cluster.insert_typed(bridge);
    }

    let backend = MockPackageBackend::new();
    backend.add_package(create_test_package("1.3.0"));
    backend.add_package(create_test_package("1.4.0"));

    let reconciler = Reconciler::new(
        Arc::new(cluster.clone()),
        Arc::new(backend.clone()),
        kafka_resource(),
    );
    (cluster, backend, reconciler)
}
