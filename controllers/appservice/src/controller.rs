//! Main controller implementation.
//!
//! Wires the Kubernetes client, the API-backed object stores and the
//! reconciler together, then runs the AppService watcher until shutdown.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::{self, Context};
use crds::AppService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main controller for AppService resources.
pub struct Controller {
    app_service_watcher: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance and starts watching.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing AppService Controller");

        let client = Client::try_default().await?;
        let config = Arc::new(config);

        let reconciler = Reconciler::new(
            Arc::new(KubeStore::<AppService>::new(client.clone())),
            Arc::new(KubeStore::<Deployment>::new(client.clone())),
            Arc::new(KubeStore::<Service>::new(client.clone())),
            config.reconciler_settings(),
        );

        let shutdown = CancellationToken::new();
        let ctx = Arc::new(Context::new(reconciler, client, config, shutdown.clone()));
        let app_service_watcher = tokio::spawn(watcher::watch_app_services(ctx));

        Ok(Self {
            app_service_watcher,
            shutdown,
        })
    }

    /// Token that cancels every in-flight reconcile when triggered.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the controller until the watcher exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("AppService Controller running");

        let result = self
            .app_service_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("AppService watcher panicked: {}", e)))?;
        self.shutdown.cancel();
        result
    }
}
