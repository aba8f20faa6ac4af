//! Object store abstraction.
//!
//! The reconciler talks to the API server only through `ObjectStore`, which
//! keeps "not found" and "conflict" distinguishable and lets unit tests run
//! against an in-memory implementation.
//!
//! There is deliberately no delete operation: children are removed by the
//! API server's owner-reference cascade, never by this controller.

mod kube_store;
#[cfg(test)]
pub mod mock;

pub use kube_store::KubeStore;

use thiserror::Error;

/// Errors returned by an `ObjectStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create raced with another create of the same name
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Update carried a stale resourceVersion
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request rejected by validation (immutable field, bad value)
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Any other Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Namespaced get/create/update with optimistic concurrency.
///
/// `update` must send the object's `metadata.resourceVersion` and fail with
/// `StoreError::Conflict` when it no longer matches the stored object.
/// All methods are `Send` so they can run on Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync,
{
    /// Fetch an object by namespace and name
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// Create a new object; fails with `AlreadyExists` if the name is taken
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an existing object, guarded by its resourceVersion
    async fn update(&self, obj: &K) -> Result<K, StoreError>;
}
