//! Reconciliation logic for AppService.
//!
//! One reconcile fetches the parent, validates it and upserts each child in
//! [`ChildKind::ORDER`]:
//! - `deployment`: the workload running the container
//! - `service`: the endpoint in front of it
//!
//! Nothing is cached between reconciles; desired state is recomputed from
//! the parent spec every time and compared with what the store returns.

mod child;
mod context;
mod deployment;
mod owner;
mod quantity;
mod service;
#[cfg(test)]
mod service_test;
mod upsert;

pub use child::ChildKind;
pub use context::{NamespacedName, ReconcileContext};
pub use upsert::UpsertResult;

use crate::backoff::RetryPolicy;
use crate::error::ControllerError;
use crate::store::ObjectStore;
use crds::{AppService, AppServiceSpec};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The AppService no longer exists
    ParentAbsent,
    /// The AppService is being deleted; the API server cascade handles children
    ParentDeleting,
    /// Every child was upserted, in reconcile order
    Reconciled(Vec<(ChildKind, UpsertResult)>),
}

impl ReconcileOutcome {
    /// True when the reconcile created or updated at least one child
    pub fn wrote_anything(&self) -> bool {
        match self {
            ReconcileOutcome::Reconciled(results) => results
                .iter()
                .any(|(_, r)| *r != UpsertResult::Unchanged),
            _ => false,
        }
    }
}

/// Knobs fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub retry: RetryPolicy,
    /// Annotation that older releases stored a spec snapshot under; `None` skips the check
    pub legacy_spec_annotation: Option<String>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            legacy_spec_annotation: Some("old/spec".to_string()),
        }
    }
}

/// Reconciles AppService resources into their Deployment and Service.
pub struct Reconciler {
    apps: Arc<dyn ObjectStore<AppService>>,
    deployments: Arc<dyn ObjectStore<Deployment>>,
    services: Arc<dyn ObjectStore<Service>>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        apps: Arc<dyn ObjectStore<AppService>>,
        deployments: Arc<dyn ObjectStore<Deployment>>,
        services: Arc<dyn ObjectStore<Service>>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            apps,
            deployments,
            services,
            settings,
        }
    }

    /// Store holding the managed Deployments (read by status sync)
    pub fn deployments(&self) -> &dyn ObjectStore<Deployment> {
        self.deployments.as_ref()
    }

    /// Reconcile the AppService at `key`.
    ///
    /// Stops at the first failing child and returns its error unchanged.
    /// Children already written stay written.
    pub async fn reconcile(
        &self,
        key: &NamespacedName,
        ctx: &ReconcileContext,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let app = match ctx.run(self.apps.get(&key.namespace, &key.name)).await? {
            Ok(app) => app,
            Err(e) if e.is_not_found() => {
                debug!("AppService {} not found, nothing to do", key);
                return Ok(ReconcileOutcome::ParentAbsent);
            }
            Err(e) => return Err(e.into()),
        };

        if app.metadata.deletion_timestamp.is_some() {
            debug!("AppService {} is being deleted, leaving children to the cascade", key);
            return Ok(ReconcileOutcome::ParentDeleting);
        }

        app.spec.validate()?;
        self.check_legacy_annotation(&app, key)?;

        let mut results = Vec::with_capacity(ChildKind::ORDER.len());
        for kind in ChildKind::ORDER {
            let retry = &self.settings.retry;
            let result = match kind {
                ChildKind::Workload => upsert::upsert(self.deployments.as_ref(), &app, retry, ctx).await?,
                ChildKind::Endpoint => upsert::upsert(self.services.as_ref(), &app, retry, ctx).await?,
            };
            results.push((kind, result));
        }

        let outcome = ReconcileOutcome::Reconciled(results);
        if outcome.wrote_anything() {
            info!("Reconciled AppService {}: {:?}", key, outcome);
        } else {
            debug!("AppService {} already in sync", key);
        }
        Ok(outcome)
    }

    /// A spec snapshot left behind by older releases must at least parse.
    /// Its content plays no part in diffing.
    fn check_legacy_annotation(&self, app: &AppService, key: &NamespacedName) -> Result<(), ControllerError> {
        let Some(annotation) = self.settings.legacy_spec_annotation.as_deref() else {
            return Ok(());
        };
        let Some(raw) = app
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(annotation))
        else {
            return Ok(());
        };

        serde_json::from_str::<AppServiceSpec>(raw).map_err(|e| ControllerError::MalformedAnnotation {
            key: annotation.to_string(),
            reason: e.to_string(),
        })?;
        debug!("AppService {} carries legacy annotation {}, ignoring it", key, annotation);
        Ok(())
    }
}
