//! Cluster access used by the reconcilers
//!
//! [`ClusterApi`] works on `DynamicObject`s so one implementation serves
//! typed companions, BridgeInstances and user-defined kinds alike. The free
//! functions at the bottom convert to and from typed resources.

use crate::error::ClusterError;
use async_trait::async_trait;
use kube::api::{
    ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams,
    PostParams,
};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

/// Cluster operations needed by the bridge reconcilers
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Look up how the cluster serves `gvk`
    async fn resolve_gvk(&self, gvk: &GroupVersionKind) -> Result<ApiResource, ClusterError>;

    /// Fetch an object by name; `Ok(None)` when it does not exist
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError>;

    /// Create `object` in `namespace` (ignored for cluster-scoped kinds).
    ///
    /// Fails with [`ClusterError::AlreadyExists`] when the name is taken
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Replace the object (spec and metadata).
    ///
    /// Fails with [`ClusterError::NotFound`] when it does not exist
    async fn update(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Write the `status` of the object through the status subresource
    async fn update_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Delete an object by name. Returns whether the object existed
    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError>;

    /// List objects matching an equality-based label selector; `None` lists all namespaces
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError>;
}

/// [`ClusterApi`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

fn object_name(resource: &ApiResource, object: &DynamicObject) -> Result<String, ClusterError> {
    object
        .metadata
        .name
        .clone()
        .ok_or_else(|| ClusterError::MissingName(resource.kind.clone()))
}

fn not_found(resource: &ApiResource, name: &str, error: kube::Error) -> ClusterError {
    match error {
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound {
            kind: resource.kind.clone(),
            name: name.to_string(),
        },
        e => ClusterError::Kube(e),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn resolve_gvk(&self, gvk: &GroupVersionKind) -> Result<ApiResource, ClusterError> {
        let (resource, _capabilities) = kube::discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| ClusterError::Discovery {
                gvk: format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind),
                reason: e.to_string(),
            })?;
        debug!(kind = %resource.kind, plural = %resource.plural, "Resolved kind");
        Ok(resource)
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        Ok(self.api(resource, namespace).get_opt(name).await?)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = object_name(resource, object)?;
        match self
            .api(resource, namespace)
            .create(&PostParams::default(), object)
            .await
        {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(ClusterError::AlreadyExists {
                kind: resource.kind.clone(),
                name,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = object_name(resource, object)?;
        self.api(resource, namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| not_found(resource, &name, e))
    }

    async fn update_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = object_name(resource, object)?;
        let status = object.data.get("status").cloned().unwrap_or_default();
        self.api(resource, namespace)
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "status": status })),
            )
            .await
            .map_err(|e| not_found(resource, &name, e))
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError> {
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }
        Ok(self.api(resource, namespace).list(&params).await?.items)
    }
}

/// Convert a typed resource into its dynamic form
pub fn to_dynamic<K: Serialize>(object: &K) -> Result<DynamicObject, ClusterError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Convert a dynamic object into a typed resource
pub fn from_dynamic<K: DeserializeOwned>(object: DynamicObject) -> Result<K, ClusterError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Fetch a typed resource by name
pub async fn get_typed<K>(
    cluster: &dyn ClusterApi,
    namespace: Option<&str>,
    name: &str,
) -> Result<Option<K>, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    cluster
        .get(&resource, namespace, name)
        .await?
        .map(from_dynamic)
        .transpose()
}

/// Create `object` unless an object with its name exists. Returns whether it was created.
pub async fn ensure_exists<K>(cluster: &dyn ClusterApi, object: &K) -> Result<bool, ClusterError>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let resource = ApiResource::erase::<K>(&());
    let meta = object.meta();
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| ClusterError::MissingName(resource.kind.clone()))?;
    let namespace = meta.namespace.as_deref();

    if cluster.get(&resource, namespace, name).await?.is_some() {
        return Ok(false);
    }
    match cluster
        .create(&resource, namespace, &to_dynamic(object)?)
        .await
    {
        Ok(_) => Ok(true),
        Err(ClusterError::AlreadyExists { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Replace a typed resource
pub async fn update_typed<K>(cluster: &dyn ClusterApi, object: &K) -> Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    let updated = cluster
        .update(&resource, object.meta().namespace.as_deref(), &to_dynamic(object)?)
        .await?;
    from_dynamic(updated)
}

/// Write the status of a typed resource
pub async fn update_status_typed<K>(cluster: &dyn ClusterApi, object: &K) -> Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    let updated = cluster
        .update_status(&resource, object.meta().namespace.as_deref(), &to_dynamic(object)?)
        .await?;
    from_dynamic(updated)
}

/// List typed resources matching `label_selector`
pub async fn list_typed<K>(
    cluster: &dyn ClusterApi,
    namespace: Option<&str>,
    label_selector: &str,
) -> Result<Vec<K>, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    cluster
        .list(&resource, namespace, label_selector)
        .await?
        .into_iter()
        .map(from_dynamic)
        .collect()
}

/// Delete a typed resource by name. Returns whether it existed.
pub async fn delete_typed<K>(
    cluster: &dyn ClusterApi,
    namespace: Option<&str>,
    name: &str,
) -> Result<bool, ClusterError>
where
    K: Resource<DynamicType = ()>,
{
    let resource = ApiResource::erase::<K>(&());
    cluster.delete(&resource, namespace, name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceAccount;
    use kube::api::ObjectMeta;

    fn service_account() -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("kafka-bridge".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_dynamic_conversion_keeps_type_meta() {
        let dynamic = to_dynamic(&service_account()).unwrap();
        let types = dynamic.types.clone().unwrap();
        assert_eq!(types.api_version, "v1");
        assert_eq!(types.kind, "ServiceAccount");

        let back: ServiceAccount = from_dynamic(dynamic).unwrap();
        assert_eq!(back.metadata.name.as_deref(), Some("kafka-bridge"));
    }
}
