//! Test utilities for unit testing the reconciler
//!
//! Fixtures for AppServices plus a bundle of in-memory stores wired into a
//! `Reconciler`.

use crate::backoff::RetryPolicy;
use crate::reconciler::{NamespacedName, ReconcileContext, Reconciler, ReconcilerSettings};
use crate::store::mock::MockStore;
use crds::{AppService, AppServiceSpec, EnvVarSpec, PortProtocol, ResourceListSpec, ResourceRequirementsSpec, ServicePortSpec};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A typical spec: 3 replicas, limits, one env var, one HTTP port 80 -> 8080
pub fn test_spec() -> AppServiceSpec {
    AppServiceSpec {
        replicas: Some(3),
        image: "nginx:1.25".to_string(),
        resources: ResourceRequirementsSpec {
            requests: None,
            limits: Some(ResourceListSpec {
                cpu: Some("500m".to_string()),
                memory: Some("128Mi".to_string()),
            }),
        },
        envs: vec![EnvVarSpec {
            name: "MODE".to_string(),
            value: Some("prod".to_string()),
        }],
        ports: vec![ServicePortSpec {
            name: Some("http".to_string()),
            port: 80,
            target_port: Some(8080),
            protocol: PortProtocol::Tcp,
        }],
    }
}

/// AppService as the API server would return it (uid and resourceVersion set)
pub fn test_app_service(name: &str, namespace: &str, spec: AppServiceSpec) -> AppService {
    AppService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{}-uid", name)),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Context that is neither cancelled nor close to its deadline
pub fn test_context() -> ReconcileContext {
    ReconcileContext::with_timeout(CancellationToken::new(), Duration::from_secs(30))
}

/// Retry policy with millisecond delays so conflict tests stay fast
pub fn test_settings() -> ReconcilerSettings {
    ReconcilerSettings {
        retry: RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..Default::default()
    }
}

/// In-memory stores for the parent and both children
pub struct TestStores {
    pub apps: Arc<MockStore<AppService>>,
    pub deployments: Arc<MockStore<Deployment>>,
    pub services: Arc<MockStore<Service>>,
}

impl TestStores {
    pub fn new() -> Self {
        Self {
            apps: MockStore::new(),
            deployments: MockStore::new(),
            services: MockStore::new(),
        }
    }

    /// Seed an AppService and return its key
    pub fn with_app(&self, app: AppService) -> NamespacedName {
        let stored = self.apps.insert(app);
        NamespacedName::of(&stored)
    }

    pub fn reconciler(&self, settings: ReconcilerSettings) -> Reconciler {
        Reconciler::new(
            self.apps.clone(),
            self.deployments.clone(),
            self.services.clone(),
            settings,
        )
    }

    /// Writes to either child store
    pub fn child_writes(&self) -> usize {
        self.deployments.writes() + self.services.writes()
    }
}
