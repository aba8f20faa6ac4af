//! Child kinds managed for every AppService.
//!
//! The set of children is closed: a Deployment ("workload") and a Service
//! ("endpoint"), reconciled in that order. Each kind implements
//! [`OwnedChild`], which bundles its desired-state builder, the carry-forward
//! of server-assigned fields, the immutable-field check and the field-scoped
//! comparator used for drift detection.

use crate::error::ControllerError;
use crds::AppService;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::fmt;

/// The children of an AppService, in reconcile order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// The `Deployment` running the container
    Workload,
    /// The `Service` exposing it
    Endpoint,
}

impl ChildKind {
    /// Fixed order children are reconciled in
    pub const ORDER: [ChildKind; 2] = [ChildKind::Workload, ChildKind::Endpoint];

    /// Kubernetes kind name
    pub fn kind_name(self) -> &'static str {
        match self {
            ChildKind::Workload => "Deployment",
            ChildKind::Endpoint => "Service",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// A Kubernetes object the controller derives from an AppService.
pub trait OwnedChild:
    Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + Default + Send + Sync + 'static
{
    /// Which child this is
    const KIND: ChildKind;

    /// Writes the controller-owned fields derived from `app` into `self`.
    ///
    /// Must be deterministic and leave every other field alone.
    fn apply_desired(&mut self, app: &AppService);

    /// Copies server-assigned immutable fields from `original` into `self`.
    fn carry_forward(&mut self, _original: &Self) {}

    /// Rejects a desired state that changes a field the server won't let change.
    fn check_immutable(_original: &Self, _desired: &Self) -> Result<(), ControllerError> {
        Ok(())
    }

    /// Compares only the controller-owned subset of the spec.
    fn owned_fields_equal(current: &Self, desired: &Self) -> bool;

    /// A blank object carrying only its identity.
    fn named(namespace: &str, name: &str) -> Self {
        let mut obj = Self::default();
        *obj.meta_mut() = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        };
        obj
    }
}
