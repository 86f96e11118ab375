//! Control-plane collaborator
//!
//! [`ClusterClient`] is the only way handlers and the build reconciler reach
//! the API server, so tests can swap in a mock and reconciles for different
//! builds share nothing but the injected client.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::{ManagedKind, ManagedObject, ObjectKey};
use crate::crd::{Build, BuildStatus};
use crate::Error;

/// Trait abstracting the Kubernetes API operations keel performs
///
/// `get` reports not-found as `Ok(None)` and `delete` treats not-found as
/// success. `update` must send the object's resourceVersion so stale writes
/// fail with [`Error::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch an object by key
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, Error>;

    /// Create a new object
    async fn create(&self, object: &ManagedObject) -> Result<(), Error>;

    /// Replace an existing object (optimistic concurrency via resourceVersion)
    async fn update(&self, object: &ManagedObject) -> Result<(), Error>;

    /// Delete an object if it exists
    async fn delete(&self, key: &ObjectKey) -> Result<(), Error>;

    /// Persist the status subresource of a Build
    async fn patch_build_status(
        &self,
        namespace: &str,
        name: &str,
        status: &BuildStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    async fn get_typed<K>(&self, key: &ObjectKey) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        Ok(self.api::<K>(&key.namespace).get_opt(&key.name).await?)
    }

    async fn create_typed<K>(&self, key: &ObjectKey, object: &K) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        self.api::<K>(&key.namespace)
            .create(&self.post_params(), object)
            .await
            .map_err(|e| Error::from_kube_write(key, e))?;
        Ok(())
    }

    async fn replace_typed<K>(&self, key: &ObjectKey, object: &K) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        self.api::<K>(&key.namespace)
            .replace(&key.name, &self.post_params(), object)
            .await
            .map_err(|e| Error::from_kube_write(key, e))?;
        Ok(())
    }

    async fn delete_typed<K>(&self, key: &ObjectKey) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        match self
            .api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(key = %key, "object already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, Error> {
        let object = match key.kind {
            ManagedKind::ServiceAccount => self
                .get_typed::<ServiceAccount>(key)
                .await?
                .map(ManagedObject::ServiceAccount),
            ManagedKind::Role => self
                .get_typed::<Role>(key)
                .await?
                .map(ManagedObject::Role),
            ManagedKind::RoleBinding => self
                .get_typed::<RoleBinding>(key)
                .await?
                .map(ManagedObject::RoleBinding),
        };
        Ok(object)
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = object.key();
        match object {
            ManagedObject::ServiceAccount(o) => self.create_typed(&key, o).await,
            ManagedObject::Role(o) => self.create_typed(&key, o).await,
            ManagedObject::RoleBinding(o) => self.create_typed(&key, o).await,
        }
    }

    async fn update(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = object.key();
        match object {
            ManagedObject::ServiceAccount(o) => self.replace_typed(&key, o).await,
            ManagedObject::Role(o) => self.replace_typed(&key, o).await,
            ManagedObject::RoleBinding(o) => self.replace_typed(&key, o).await,
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), Error> {
        match key.kind {
            ManagedKind::ServiceAccount => self.delete_typed::<ServiceAccount>(key).await,
            ManagedKind::Role => self.delete_typed::<Role>(key).await,
            ManagedKind::RoleBinding => self.delete_typed::<RoleBinding>(key).await,
        }
    }

    async fn patch_build_status(
        &self,
        namespace: &str,
        name: &str,
        status: &BuildStatus,
    ) -> Result<(), Error> {
        let api: Api<Build> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }
}
