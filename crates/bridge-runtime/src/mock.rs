//! Mock ClusterApi for unit testing
//!
//! Keeps objects in memory, assigns resource versions and uids on write and
//! counts every write so tests can assert idempotence.

use crate::cluster::{ClusterApi, to_dynamic};
use crate::error::ClusterError;
use async_trait::async_trait;
use kube::Resource;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, TypeMeta};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type ObjectId = (String, String, Option<String>, String);

/// Writes recorded by [`MockClusterApi`] since the last reset
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteCounts {
    /// Successful `create` calls
    pub creates: usize,
    /// Successful `update` calls
    pub updates: usize,
    /// Successful `update_status` calls
    pub status_updates: usize,
    /// `delete` calls that removed an object
    pub deletes: usize,
}

impl WriteCounts {
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.status_updates + self.deletes
    }
}

/// In-memory cluster
#[derive(Clone, Default)]
pub struct MockClusterApi {
    kinds: Arc<Mutex<Vec<ApiResource>>>,
    objects: Arc<Mutex<BTreeMap<ObjectId, DynamicObject>>>,
    counts: Arc<Mutex<WriteCounts>>,
    next_version: Arc<Mutex<u64>>,
}

fn object_id(resource: &ApiResource, namespace: Option<&str>, name: &str) -> ObjectId {
    (
        resource.api_version.clone(),
        resource.plural.clone(),
        namespace.map(str::to_string),
        name.to_string(),
    )
}

fn matches_selector(object: &DynamicObject, selector: &str) -> bool {
    let labels = object.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

impl MockClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `resource` resolvable through [`ClusterApi::resolve_gvk`]
    pub fn register(&self, resource: ApiResource) {
        self.kinds.lock().unwrap().push(resource);
    }

    /// Seed an object without counting a write
    pub fn insert(&self, resource: &ApiResource, mut object: DynamicObject) {
        let name = object.metadata.name.clone().unwrap_or_default();
        let id = object_id(resource, object.metadata.namespace.as_deref(), &name);
        self.stamp(resource, &mut object, true);
        self.objects.lock().unwrap().insert(id, object);
    }

    /// Seed a typed object without counting a write
    pub fn insert_typed<K>(&self, object: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let resource = ApiResource::erase::<K>(&());
        self.insert(&resource, to_dynamic(object).unwrap());
    }

    pub fn object(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&object_id(resource, namespace, name))
            .cloned()
    }

    /// All stored objects of one kind
    pub fn objects_of(&self, resource: &ApiResource) -> Vec<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((api_version, plural, _, _), _)| {
                *api_version == resource.api_version && *plural == resource.plural
            })
            .map(|(_, object)| object.clone())
            .collect()
    }

    pub fn counts(&self) -> WriteCounts {
        *self.counts.lock().unwrap()
    }

    pub fn writes(&self) -> usize {
        self.counts().total()
    }

    pub fn reset_counts(&self) {
        *self.counts.lock().unwrap() = WriteCounts::default();
    }

    /// Assign a new resourceVersion, plus type meta and uid on first write
    fn stamp(&self, resource: &ApiResource, object: &mut DynamicObject, created: bool) {
        let mut next = self.next_version.lock().unwrap();
        *next += 1;
        object.metadata.resource_version = Some(next.to_string());
        if created && object.metadata.uid.is_none() {
            object.metadata.uid = Some(format!("uid-{}", *next));
        }
        if object.types.is_none() {
            object.types = Some(TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
        }
    }

    fn name_of(resource: &ApiResource, object: &DynamicObject) -> Result<String, ClusterError> {
        object
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClusterError::MissingName(resource.kind.clone()))
    }
}

#[async_trait]
impl ClusterApi for MockClusterApi {
    async fn resolve_gvk(&self, gvk: &GroupVersionKind) -> Result<ApiResource, ClusterError> {
        self.kinds
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.group == gvk.group && r.version == gvk.version && r.kind == gvk.kind)
            .cloned()
            .ok_or_else(|| ClusterError::Discovery {
                gvk: format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind),
                reason: "not registered with the mock".to_string(),
            })
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        Ok(self.object(resource, namespace, name))
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = Self::name_of(resource, object)?;
        let id = object_id(resource, namespace, &name);
        if self.objects.lock().unwrap().contains_key(&id) {
            return Err(ClusterError::AlreadyExists {
                kind: resource.kind.clone(),
                name,
            });
        }
        let mut created = object.clone();
        created.metadata.namespace = namespace.map(str::to_string);
        self.stamp(resource, &mut created, true);
        self.objects.lock().unwrap().insert(id, created.clone());
        self.counts.lock().unwrap().creates += 1;
        Ok(created)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = Self::name_of(resource, object)?;
        let id = object_id(resource, namespace, &name);
        let existing = self
            .object(resource, namespace, &name)
            .ok_or_else(|| ClusterError::NotFound {
                kind: resource.kind.clone(),
                name: name.clone(),
            })?;

        let mut updated = object.clone();
        // Status only changes through the status subresource
        match existing.data.get("status") {
            Some(status) => updated.data["status"] = status.clone(),
            None => {
                if let Some(fields) = updated.data.as_object_mut() {
                    fields.remove("status");
                }
            }
        }
        self.stamp(resource, &mut updated, false);
        self.objects.lock().unwrap().insert(id, updated.clone());
        self.counts.lock().unwrap().updates += 1;
        Ok(updated)
    }

    async fn update_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = Self::name_of(resource, object)?;
        let id = object_id(resource, namespace, &name);
        let mut updated = self
            .object(resource, namespace, &name)
            .ok_or_else(|| ClusterError::NotFound {
                kind: resource.kind.clone(),
                name: name.clone(),
            })?;
        updated.data["status"] = object.data.get("status").cloned().unwrap_or_default();
        self.stamp(resource, &mut updated, false);
        self.objects.lock().unwrap().insert(id, updated.clone());
        self.counts.lock().unwrap().status_updates += 1;
        Ok(updated)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&object_id(resource, namespace, name))
            .is_some();
        if removed {
            self.counts.lock().unwrap().deletes += 1;
        }
        Ok(removed)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        Ok(self
            .objects_of(resource)
            .into_iter()
            .filter(|object| namespace.is_none() || object.metadata.namespace.as_deref() == namespace)
            .filter(|object| matches_selector(object, label_selector))
            .collect())
    }
}
