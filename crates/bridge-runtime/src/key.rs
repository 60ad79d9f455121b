//! Queue keys

use kube::Resource;
use kube_runtime::reflector::ObjectRef;
use std::fmt;

/// Identity of a watched object, displayed as `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Key of a resource; an unnamed object yields an empty name.
    pub fn from_resource<K: Resource>(object: &K) -> Self {
        let meta = object.meta();
        Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// Reference into a reflector store
    pub fn to_object_ref<K: Resource>(&self, dyntype: K::DynamicType) -> ObjectRef<K> {
        let reference = ObjectRef::new_with(&self.name, dyntype);
        match &self.namespace {
            Some(namespace) => reference.within(namespace),
            None => reference,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    #[test]
    fn test_display() {
        assert_eq!(ObjectKey::new(Some("default"), "db").to_string(), "default/db");
        assert_eq!(ObjectKey::new(None, "cluster-wide").to_string(), "cluster-wide");
    }

    #[test]
    fn test_from_resource() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".to_string()),
                namespace: Some("kudo".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let key = ObjectKey::from_resource(&cm);
        assert_eq!(key, ObjectKey::new(Some("kudo"), "settings"));
        assert_eq!(key.to_object_ref::<ConfigMap>(()), ObjectRef::from_obj(&cm));
    }
}
