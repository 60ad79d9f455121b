//! KUDO parameter extraction
//!
//! The bridge's `crdSpec` template mirrors the shape of the watched resource
//! and names a KUDO parameter at every path whose value should be forwarded.
//! Both trees are flattened and compared path by path.

use flatmap::{FlatMap, Leaf};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Map each accepted parameter named in `template` to the value `observed`
/// holds at the same path.
///
/// Paths missing from either side and null observed values are skipped.
/// When several paths name the same parameter, the lexicographically last
/// path wins.
pub fn extract_parameters(
    template: &Value,
    observed: &Value,
    accepted: &BTreeSet<&str>,
) -> BTreeMap<String, String> {
    let template = FlatMap::from_json(template);
    let observed = FlatMap::from_json(observed);
    let mut parameters: BTreeMap<String, String> = BTreeMap::new();

    for (path, leaf) in template.iter() {
        let Leaf::Scalar(parameter) = leaf else {
            continue;
        };
        if !accepted.contains(parameter.as_str()) {
            continue;
        }
        let Some(Leaf::Scalar(value)) = observed.get(path) else {
            continue;
        };
        if let Some(previous) = parameters.insert(parameter.clone(), value.clone()) {
            if previous != *value {
                warn!(
                    parameter = %parameter,
                    path,
                    "Parameter mapped from several paths, overriding {:?} with {:?}",
                    previous,
                    value
                );
            }
        }
    }

    parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn accepted<'a>(names: &[&'a str]) -> BTreeSet<&'a str> {
        names.iter().copied().collect()
    }

    #[test]
    fn test_replicas_maps_to_parameter() {
        let params = extract_parameters(
            &json!({"spec": {"replicas": "REPLICAS"}}),
            &json!({"spec": {"replicas": "3"}}),
            &accepted(&["REPLICAS"]),
        );
        assert_eq!(params, BTreeMap::from([("REPLICAS".to_string(), "3".to_string())]));
    }

    #[test]
    fn test_numbers_and_booleans_are_stringified() {
        let params = extract_parameters(
            &json!({"spec": {"brokers": "BROKER_COUNT", "tls": "TLS_ENABLED"}}),
            &json!({"spec": {"brokers": 5, "tls": true}}),
            &accepted(&["BROKER_COUNT", "TLS_ENABLED"]),
        );
        assert_eq!(params["BROKER_COUNT"], "5");
        assert_eq!(params["TLS_ENABLED"], "true");
    }

    #[test]
    fn test_unknown_names_and_missing_paths_are_ignored() {
        let params = extract_parameters(
            &json!({
                "apiVersion": "kafka.example.dev/v1",
                "spec": {"replicas": "REPLICAS", "zone": "ZONE", "memory": "MEMORY"}
            }),
            &json!({
                "apiVersion": "kafka.example.dev/v1",
                "spec": {"replicas": "3", "memory": null, "extra": "x"}
            }),
            &accepted(&["REPLICAS", "ZONE", "MEMORY"]),
        );
        assert_eq!(params.len(), 1);
        assert_eq!(params["REPLICAS"], "3");
    }

    #[test]
    fn test_values_inside_arrays() {
        let params = extract_parameters(
            &json!({"spec": {"listeners": [{"port": "PLAIN_PORT"}, {"port": "TLS_PORT"}]}}),
            &json!({"spec": {"listeners": [{"port": 9092}, {"port": 9093}]}}),
            &accepted(&["PLAIN_PORT", "TLS_PORT"]),
        );
        assert_eq!(params["PLAIN_PORT"], "9092");
        assert_eq!(params["TLS_PORT"], "9093");
    }

    #[test]
    fn test_conflicting_paths_last_one_wins() {
        let params = extract_parameters(
            &json!({"spec": {"a": "SIZE", "b": "SIZE"}}),
            &json!({"spec": {"a": "small", "b": "large"}}),
            &accepted(&["SIZE"]),
        );
        assert_eq!(params["SIZE"], "large");
    }

    #[test]
    fn test_dotted_annotation_key_matches_only_itself() {
        let template = json!({"metadata": {"annotations": {"example.dev/size": "SIZE"}}});
        let params = extract_parameters(
            &template,
            &json!({"metadata": {"annotations": {"example.dev/size": "large"}}}),
            &accepted(&["SIZE"]),
        );
        assert_eq!(params["SIZE"], "large");

        let params = extract_parameters(
            &template,
            &json!({"metadata": {"annotations": {"example": {"dev/size": "wrong"}}}}),
            &accepted(&["SIZE"]),
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_nested_observed_value_is_not_a_parameter() {
        let params = extract_parameters(
            &json!({"spec": {"config": "CONFIG"}}),
            &json!({"spec": {"config": {"key": "value"}}}),
            &accepted(&["CONFIG"]),
        );
        assert!(params.is_empty());
    }
}
