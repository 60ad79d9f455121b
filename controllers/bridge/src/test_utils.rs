//! Test utilities for unit testing the BridgeInstance reconciler
//!
//! Fixtures for bridges and an in-memory cluster serving the bridged kind.

use crate::reconciler::Reconciler;
use bridge_runtime::MockClusterApi;
use bridge_runtime::cluster::from_dynamic;
use crds::{BRIDGE_FINALIZER, BridgeInstance, BridgeInstanceSpec, KudoOperator};
use kube::Resource;
use kube::api::{ApiResource, GroupVersionKind};
use serde_json::json;
use std::sync::Arc;

/// Kind bridged by the test fixtures
pub fn kafka_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("kafka.example.dev", "v1", "Kafka"),
        "kafkas",
    )
}

/// Helper to create a test BridgeInstance bridging `Kafka` to the kafka package
pub fn create_test_bridge(name: &str, namespace: &str) -> BridgeInstance {
    let mut bridge = BridgeInstance::new(
        name,
        BridgeInstanceSpec {
            kudo_operator: KudoOperator {
                package: "kafka".to_string(),
                version: "1.3.0".to_string(),
                ..KudoOperator::default()
            },
            crd_spec: json!({
                "apiVersion": "kafka.example.dev/v1",
                "kind": "Kafka",
                "spec": {"brokers": "BROKER_COUNT"}
            }),
        },
    );
    bridge.metadata.namespace = Some(namespace.to_string());
    bridge.metadata.uid = Some(format!("uid-{name}"));
    bridge
}

/// Helper to create a BridgeInstance that is being deleted
pub fn create_deleted_bridge(name: &str, namespace: &str, with_finalizer: bool) -> BridgeInstance {
    let mut bridge = create_test_bridge(name, namespace);
    bridge.metadata.deletion_timestamp =
        Some(serde_json::from_value(json!("2026-01-01T00:00:00Z")).unwrap());
    if with_finalizer {
        bridge.metadata.finalizers = Some(vec![BRIDGE_FINALIZER.to_string()]);
    }
    bridge
}

/// Mock cluster serving the Kafka kind and holding `bridges`
pub fn setup_cluster(bridges: &[&BridgeInstance]) -> MockClusterApi {
    let cluster = MockClusterApi::new();
    cluster.register(kafka_resource());
    for bridge in bridges {
        cluster.insert_typed(*bridge);
    }
    cluster
}

pub fn create_test_reconciler(cluster: &MockClusterApi) -> Reconciler {
    Reconciler::new(Arc::new(cluster.clone()), "watcher:test")
}

/// Current state of a bridge in the mock cluster
pub fn fetch_bridge(cluster: &MockClusterApi, namespace: &str, name: &str) -> Option<BridgeInstance> {
    cluster
        .object(&ApiResource::erase::<BridgeInstance>(&()), Some(namespace), name)
        .map(|object| from_dynamic(object).unwrap())
}

/// Number of stored objects of kind `K`
pub fn count_of<K: Resource<DynamicType = ()>>(cluster: &MockClusterApi) -> usize {
    cluster.objects_of(&ApiResource::erase::<K>(&())).len()
}
