//! Desired state of the managed Deployment ("workload").
//!
//! Owned fields:
//! - `spec.replicas`, only when the AppService sets it
//! - `spec.selector` (`app=<name>`, immutable once created)
//! - the `app` label on the pod template
//! - the single container named after the AppService: image, resources,
//!   env, ports, pull policy

use super::child::{ChildKind, OwnedChild};
use super::quantity::Amount;
use crate::error::ControllerError;
use crds::{APP_LABEL, AppService, EnvVarSpec, ResourceListSpec, ResourceRequirementsSpec, ServicePortSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use std::collections::BTreeMap;

const IMAGE_PULL_POLICY: &str = "IfNotPresent";
const DEFAULT_PROTOCOL: &str = "TCP";

/// Labels shared by the pod template and both selectors.
pub fn app_labels(app: &AppService) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), app.name_any())])
}

fn app_selector(app: &AppService) -> LabelSelector {
    LabelSelector {
        match_labels: Some(app_labels(app)),
        ..Default::default()
    }
}

fn quantities(list: Option<&ResourceListSpec>) -> Option<BTreeMap<String, Quantity>> {
    let list = list.filter(|l| !l.is_empty())?;
    let mut out = BTreeMap::new();
    if let Some(cpu) = &list.cpu {
        out.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &list.memory {
        out.insert("memory".to_string(), Quantity(memory.clone()));
    }
    Some(out)
}

fn resource_requirements(resources: &ResourceRequirementsSpec) -> Option<ResourceRequirements> {
    let requests = quantities(resources.requests.as_ref());
    let limits = quantities(resources.limits.as_ref());
    if requests.is_none() && limits.is_none() {
        return None;
    }
    Some(ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    })
}

fn env_vars(envs: &[EnvVarSpec]) -> Option<Vec<EnvVar>> {
    if envs.is_empty() {
        return None;
    }
    Some(
        envs.iter()
            .map(|e| EnvVar {
                name: e.name.clone(),
                value: e.value.clone(),
                ..Default::default()
            })
            .collect(),
    )
}

fn container_ports(ports: &[ServicePortSpec]) -> Option<Vec<ContainerPort>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|p| ContainerPort {
                container_port: p.effective_target_port(),
                protocol: Some(p.protocol.as_str().to_string()),
                ..Default::default()
            })
            .collect(),
    )
}

/// Writes the owned container fields into `container`, keeping the rest
/// (server defaults such as terminationMessagePath survive).
fn apply_container(app: &AppService, container: &mut Container) {
    container.name = app.name_any();
    container.image = Some(app.spec.image.clone());
    container.image_pull_policy = Some(IMAGE_PULL_POLICY.to_string());
    container.resources = resource_requirements(&app.spec.resources);
    container.env = env_vars(&app.spec.envs);
    container.ports = container_ports(&app.spec.ports);
}

/// Normalised view of a container's owned fields.
///
/// Unset and empty collections compare equal, an unset port protocol
/// equals the server default "TCP", and quantities compare by value.
#[derive(Debug, PartialEq, Eq)]
struct ContainerView<'a> {
    name: &'a str,
    image: Option<&'a str>,
    image_pull_policy: Option<&'a str>,
    requests: BTreeMap<&'a str, Amount<'a>>,
    limits: BTreeMap<&'a str, Amount<'a>>,
    env: Vec<(&'a str, Option<&'a str>, bool)>,
    ports: Vec<(i32, Option<&'a str>, &'a str)>,
}

fn quantity_view(map: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<&str, Amount<'_>> {
    map.map(|m| m.iter().map(|(k, v)| (k.as_str(), Amount::of(v))).collect())
        .unwrap_or_default()
}

impl<'a> ContainerView<'a> {
    fn of(c: &'a Container) -> Self {
        let resources = c.resources.as_ref();
        Self {
            name: &c.name,
            image: c.image.as_deref(),
            image_pull_policy: c.image_pull_policy.as_deref(),
            requests: quantity_view(resources.and_then(|r| r.requests.as_ref())),
            limits: quantity_view(resources.and_then(|r| r.limits.as_ref())),
            env: c
                .env
                .iter()
                .flatten()
                .map(|e| (e.name.as_str(), e.value.as_deref(), e.value_from.is_some()))
                .collect(),
            ports: c
                .ports
                .iter()
                .flatten()
                .map(|p| {
                    (
                        p.container_port,
                        p.name.as_deref(),
                        p.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL),
                    )
                })
                .collect(),
        }
    }
}

/// Normalised view of all owned Deployment fields.
#[derive(Debug, PartialEq)]
struct DeploymentView<'a> {
    replicas: Option<i32>,
    selector: Option<&'a LabelSelector>,
    template_labels: Option<&'a BTreeMap<String, String>>,
    containers: Vec<ContainerView<'a>>,
}

impl<'a> DeploymentView<'a> {
    fn of(d: &'a Deployment) -> Self {
        let spec = d.spec.as_ref();
        let template = spec.map(|s| &s.template);
        Self {
            replicas: spec.and_then(|s| s.replicas),
            selector: spec.map(|s| &s.selector),
            template_labels: template
                .and_then(|t| t.metadata.as_ref())
                .and_then(|m| m.labels.as_ref()),
            containers: template
                .and_then(|t| t.spec.as_ref())
                .map(|p| p.containers.iter().map(ContainerView::of).collect())
                .unwrap_or_default(),
        }
    }
}

impl OwnedChild for Deployment {
    const KIND: ChildKind = ChildKind::Workload;

    /// Projects the AppService onto the Deployment.
    ///
    /// An unset `replicas` leaves the stored count alone rather than clearing
    /// it, so scaling by hand or by an autoscaler survives; a new Deployment
    /// then gets the server default of 1.
    fn apply_desired(&mut self, app: &AppService) {
        let spec = self.spec.get_or_insert_with(DeploymentSpec::default);
        if let Some(replicas) = app.spec.replicas {
            spec.replicas = Some(replicas);
        }
        spec.selector = app_selector(app);

        let template_meta = spec.template.metadata.get_or_insert_with(ObjectMeta::default);
        template_meta
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(app_labels(app));

        let pod = spec.template.spec.get_or_insert_with(PodSpec::default);
        let name = app.name_any();
        let mut container = pod
            .containers
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .unwrap_or_default();
        apply_container(app, &mut container);
        pod.containers = vec![container];
    }

    fn check_immutable(original: &Self, desired: &Self) -> Result<(), ControllerError> {
        let current = original.spec.as_ref().map(|s| &s.selector);
        let wanted = desired.spec.as_ref().map(|s| &s.selector);
        if current.is_some() && current != wanted {
            return Err(ControllerError::ImmutableField {
                kind: Self::KIND,
                name: original.name_any(),
                field: "spec.selector",
            });
        }
        Ok(())
    }

    fn owned_fields_equal(current: &Self, desired: &Self) -> bool {
        DeploymentView::of(current) == DeploymentView::of(desired)
    }
}
