//! `ObjectStore` backed by the Kubernetes API server.

use super::{ObjectStore, StoreError};
use k8s_openapi::NamespaceResourceScope;
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// Typed store for one namespaced resource kind.
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    /// Creates a store sharing the given client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> std::fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of(obj: &K) -> Result<String, StoreError> {
        obj.namespace().ok_or_else(|| {
            StoreError::Invalid(format!("{} {} has no namespace", K::kind(&()), obj.name_any()))
        })
    }
}

/// Maps API status codes onto the store's error taxonomy.
///
/// A 409 means "name taken" on create but "stale resourceVersion" on update,
/// so the caller says which one it is handling.
fn classify(err: kube::Error, what: &str, conflict_is_exists: bool) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(what.to_string()),
        kube::Error::Api(ae) if ae.code == 409 && conflict_is_exists => {
            StoreError::AlreadyExists(what.to_string())
        }
        kube::Error::Api(ae) if ae.code == 409 => {
            StoreError::Conflict(format!("{}: {}", what, ae.message))
        }
        kube::Error::Api(ae) if ae.code == 422 => {
            StoreError::Invalid(format!("{}: {}", what, ae.message))
        }
        other => StoreError::Kube(other),
    }
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let what = format!("{} {}/{}", K::kind(&()), namespace, name);
        debug!("GET {}", what);
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, &what, false))
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = Self::namespace_of(obj)?;
        let what = format!("{} {}/{}", K::kind(&()), namespace, obj.name_any());
        debug!("CREATE {}", what);
        self.api(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| classify(e, &what, true))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = Self::namespace_of(obj)?;
        let name = obj.name_any();
        let what = format!("{} {}/{}", K::kind(&()), namespace, name);
        debug!(
            "UPDATE {} at resourceVersion {}",
            what,
            obj.resource_version().unwrap_or_default()
        );
        self.api(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| classify(e, &what, false))
    }
}
