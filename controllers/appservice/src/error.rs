//! Controller-specific error types.
//!
//! This module defines the errors surfaced by the AppService Controller.
//! Everything except store-level "not found" bubbles unchanged to the
//! dispatcher, which owns requeue scheduling.

use crate::reconciler::ChildKind;
use crate::store::StoreError;
use crds::SpecValidationError;
use thiserror::Error;

/// Errors that can occur in the AppService Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object store error (Kubernetes API or test store)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes client error outside the object store (client setup, status patch)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Every update attempt hit a concurrent modification
    #[error("{kind} {name}: update conflicted {attempts} times, giving up")]
    ConflictRetriesExhausted {
        kind: ChildKind,
        name: String,
        attempts: u32,
    },

    /// Desired state would change a field the API server treats as immutable
    #[error("{kind} {name}: refusing to change immutable field {field}")]
    ImmutableField {
        kind: ChildKind,
        name: String,
        field: &'static str,
    },

    /// Parent spec fails validation
    #[error("Invalid AppService spec: {0}")]
    InvalidSpec(#[from] SpecValidationError),

    /// Legacy spec snapshot annotation present but unparseable
    #[error("Malformed annotation {key}: {reason}")]
    MalformedAnnotation { key: String, reason: String },

    /// Owner reference cannot be set
    #[error("Ownership error: {0}")]
    Ownership(String),

    /// Reconcile cancelled by the caller
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// Reconcile ran past its deadline
    #[error("Reconciliation deadline exceeded")]
    DeadlineExceeded,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Errors that retrying the same reconcile cannot fix without an
    /// external change (spec edit, manual cleanup).
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ControllerError::ImmutableField { .. }
                | ControllerError::InvalidSpec(_)
                | ControllerError::MalformedAnnotation { .. }
                | ControllerError::Ownership(_)
        )
    }
}
