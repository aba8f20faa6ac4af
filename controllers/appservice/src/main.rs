//! AppService Controller
//!
//! Keeps a `Deployment` and a `Service` in line with every `AppService`
//! custom resource: creates them on first sight, corrects drift in the
//! fields it owns and leaves deletion to Kubernetes garbage collection.

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod status;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider()) {
        debug!(?e, "CryptoProvider already installed; proceeding");
    }

    info!("Starting AppService Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Reconcile timeout: {:?}", config.reconcile_timeout);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!(
        "  Conflict retry: {} attempts from {:?}",
        config.retry.max_attempts, config.retry.initial_delay
    );
    info!("  Concurrency: {}, debounce: {:?}", config.concurrency, config.debounce);
    info!(
        "  Legacy spec annotation: {}",
        config.legacy_spec_annotation.as_deref().unwrap_or("disabled")
    );
    info!("  Status sync: {}", config.status_sync);

    let controller = Controller::new(config).await?;

    // In-flight reconciles stop at their next API call on Ctrl-C; the
    // watcher itself shuts down on SIGINT/SIGTERM.
    let shutdown = controller.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, cancelling in-flight reconciles");
            shutdown.cancel();
        }
    });

    controller.run().await?;

    info!("AppService Controller stopped");
    Ok(())
}
