//! Kubernetes resource watcher.
//!
//! Drives the reconciler from a `kube_runtime::Controller` over AppService
//! that also owns Deployments and Services, so a change to either child
//! re-triggers its parent. Requeue timing lives here:
//! - success: requeue after the resync interval, backoff reset
//! - failure: per-key Fibonacci backoff (1m up to 10m)
//! - cancelled: requeue after the first backoff step, backoff untouched
//! - parent absent or deleting: wait for a change, backoff state dropped

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::{NamespacedName, ReconcileContext, ReconcileOutcome, Reconciler};
use crate::status;
use crds::AppService;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Backoff state for one AppService
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::for_reconcile_errors(),
            error_count: 0,
        }
    }
}

/// Shared state handed to every reconcile.
pub struct Context {
    reconciler: Reconciler,
    client: Client,
    config: Arc<ControllerConfig>,
    shutdown: CancellationToken,
    /// namespace/name -> BackoffState
    backoff_states: Mutex<HashMap<NamespacedName, BackoffState>>,
}

impl Context {
    pub fn new(
        reconciler: Reconciler,
        client: Client,
        config: Arc<ControllerConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            client,
            config,
            shutdown,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Next requeue delay for `key` and how many errors it has hit in a row
    fn next_backoff(&self, key: &NamespacedName) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.clone()).or_insert_with(BackoffState::new);
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (FibonacciBackoff::for_reconcile_errors().next_backoff(), 0)
            }
        }
    }

    /// Drop the state of an AppService that is gone or going away
    fn forget_backoff(&self, key: &NamespacedName) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }

    fn reset_backoff(&self, key: &NamespacedName) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.error_count = 0;
                state.backoff.reset();
            }
        }
    }
}

async fn reconcile(app: Arc<AppService>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = NamespacedName::of(app.as_ref());
    debug!("Reconciling AppService {}", key);

    let rctx = ReconcileContext::with_timeout(ctx.shutdown.child_token(), ctx.config.reconcile_timeout);
    let outcome = ctx.reconciler.reconcile(&key, &rctx).await?;

    match outcome {
        ReconcileOutcome::ParentAbsent | ReconcileOutcome::ParentDeleting => {
            ctx.forget_backoff(&key);
            Ok(Action::await_change())
        }
        ReconcileOutcome::Reconciled(_) => {
            ctx.reset_backoff(&key);
            if ctx.config.status_sync {
                if let Err(e) = status::sync_status(&ctx.client, ctx.reconciler.deployments(), &app).await {
                    warn!("Failed to sync status of AppService {}: {}", key, e);
                }
            }
            Ok(Action::requeue(ctx.config.resync_interval))
        }
    }
}

fn error_policy(app: Arc<AppService>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = NamespacedName::of(app.as_ref());

    if matches!(error, ControllerError::Cancelled) {
        let delay = FibonacciBackoff::for_reconcile_errors().next_backoff();
        info!("Reconcile of AppService {} cancelled, requeue in {:?}", key, delay);
        return Action::requeue(delay);
    }

    let (delay, error_count) = ctx.next_backoff(&key);
    if error.is_permanent() {
        error!(
            "Reconcile of AppService {} failed (attempt {}, needs a spec or cluster change): {}; requeue in {:?}",
            key, error_count, error, delay
        );
    } else {
        warn!(
            "Reconcile of AppService {} failed (attempt {}): {}; requeue in {:?}",
            key, error_count, error, delay
        );
    }
    Action::requeue(delay)
}

fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Watch AppServices and their children until SIGINT/SIGTERM.
pub async fn watch_app_services(ctx: Arc<Context>) -> Result<(), ControllerError> {
    let config = ctx.config.clone();
    let namespace = config.namespace.as_deref();
    info!(
        "Starting AppService watcher (namespace: {})",
        namespace.unwrap_or("all namespaces")
    );

    let apps: Api<AppService> = api_for(&ctx.client, namespace);
    let deployments: Api<Deployment> = api_for(&ctx.client, namespace);
    let services: Api<Service> = api_for(&ctx.client, namespace);

    let runtime_config = RuntimeConfig::default()
        .debounce(config.debounce)
        .concurrency(config.concurrency);

    Controller::new(apps, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .with_config(runtime_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _action)) => debug!("Reconciled {}", obj),
                Err(e) => warn!("AppService controller error: {}", e),
            }
        })
        .await;

    info!("AppService watcher stopped");
    Ok(())
}
