//! Per-reconcile key and cancellation context.

use crate::error::ControllerError;
use kube::{Resource, ResourceExt};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Namespace + name identifying one AppService (and its children).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object; objects without a namespace land in "default".
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(
            obj.namespace().unwrap_or_else(|| "default".to_string()),
            obj.name_any(),
        )
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Cancellation signal and deadline for one reconcile.
///
/// Every API call made during a reconcile goes through [`ReconcileContext::run`],
/// so a cancelled or expired reconcile stops before its next write.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    cancel: CancellationToken,
    deadline: Instant,
}

impl ReconcileContext {
    pub fn new(cancel: CancellationToken, deadline: Instant) -> Self {
        Self { cancel, deadline }
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(cancel: CancellationToken, timeout: Duration) -> Self {
        Self::new(cancel, Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails fast if the reconcile must not continue.
    pub fn check(&self) -> Result<(), ControllerError> {
        if self.cancel.is_cancelled() {
            return Err(ControllerError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ControllerError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `fut` unless the context is cancelled or its deadline passes first.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<Result<T, E>, ControllerError>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ControllerError::Cancelled),
            () = tokio::time::sleep_until(self.deadline) => Err(ControllerError::DeadlineExceeded),
            result = fut => Ok(result),
        }
    }

    /// Sleeps for `delay`, waking early with an error on cancellation or deadline.
    pub async fn sleep(&self, delay: Duration) -> Result<(), ControllerError> {
        self.run(async {
            tokio::time::sleep(delay).await;
            Ok::<(), ControllerError>(())
        })
        .await?
    }
}
