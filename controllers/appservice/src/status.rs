//! Status sync: mirrors the managed Deployment's status onto the AppService.
//!
//! Runs after a successful reconcile and only patches when the mirrored
//! fields changed, so the status write does not wake the controller again
//! with nothing to do.

use crate::error::ControllerError;
use crate::reconciler::NamespacedName;
use crate::store::ObjectStore;
use crds::{AppService, AppServiceCondition, AppServiceStatus};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::{debug, info};

/// Status the AppService should carry given its Deployment.
pub fn status_from_deployment(deployment: &Deployment) -> AppServiceStatus {
    let Some(observed) = deployment.status.as_ref() else {
        return AppServiceStatus::default();
    };
    AppServiceStatus {
        replicas: observed.replicas,
        ready_replicas: observed.ready_replicas,
        available_replicas: observed.available_replicas,
        updated_replicas: observed.updated_replicas,
        observed_generation: observed.observed_generation,
        conditions: observed
            .conditions
            .iter()
            .flatten()
            .map(|c| AppServiceCondition {
                type_: c.type_.clone(),
                status: c.status.clone(),
                reason: c.reason.clone(),
                message: c.message.clone(),
                last_transition_time: c
                    .last_transition_time
                    .as_ref()
                    .and_then(|t| serde_json::to_value(t).ok())
                    .and_then(|v| v.as_str().map(str::to_string)),
            })
            .collect(),
        last_synced: None,
    }
}

/// True when `current` differs from `observed` in any mirrored field.
/// `last_synced` is bookkeeping and never counts.
pub fn status_needs_update(current: Option<&AppServiceStatus>, observed: &AppServiceStatus) -> bool {
    match current {
        None => true,
        Some(current) => {
            let mut current = current.clone();
            current.last_synced = None;
            current != *observed
        }
    }
}

/// Patch the AppService status from its Deployment when they disagree.
///
/// Returns whether a patch was sent. A missing Deployment is not an error.
pub async fn sync_status(
    client: &Client,
    deployments: &dyn ObjectStore<Deployment>,
    app: &AppService,
) -> Result<bool, ControllerError> {
    let key = NamespacedName::of(app);
    let deployment = match deployments.get(&key.namespace, &key.name).await {
        Ok(d) => d,
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let mut observed = status_from_deployment(&deployment);
    if !status_needs_update(app.status.as_ref(), &observed) {
        debug!("AppService {} status is current", key);
        return Ok(false);
    }

    observed.last_synced = Some(chrono::Utc::now());
    let api: Api<AppService> = Api::namespaced(client.clone(), &key.namespace);
    let patch = json!({ "status": observed });
    api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    info!(
        "Updated AppService {} status: {}/{} ready",
        key,
        observed.ready_replicas.unwrap_or(0),
        observed.replicas.unwrap_or(0)
    );
    Ok(true)
}
