//! Desired state of the managed Service ("endpoint").
//!
//! Owned fields are `spec.ports` and `spec.selector`. The cluster IP is
//! assigned by the API server on create and is immutable afterwards, so it is
//! carried forward from the stored object before comparing.

use super::child::{ChildKind, OwnedChild};
use super::deployment::app_labels;
use crds::{AppService, ServicePortSpec};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const DEFAULT_PROTOCOL: &str = "TCP";

fn service_ports(ports: &[ServicePortSpec]) -> Option<Vec<ServicePort>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|p| ServicePort {
                name: p.name.clone(),
                port: p.port,
                target_port: Some(IntOrString::Int(p.effective_target_port())),
                protocol: Some(p.protocol.as_str().to_string()),
                ..Default::default()
            })
            .collect(),
    )
}

/// Owned Service fields with server defaults folded in: an unset target port
/// equals the port, an unset protocol equals "TCP".
#[derive(Debug, PartialEq)]
struct ServiceView<'a> {
    selector: BTreeMap<&'a str, &'a str>,
    ports: Vec<(Option<&'a str>, i32, IntOrString, &'a str)>,
}

impl<'a> ServiceView<'a> {
    fn of(s: &'a Service) -> Self {
        let spec = s.spec.as_ref();
        Self {
            selector: spec
                .and_then(|s| s.selector.as_ref())
                .map(|m| m.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
                .unwrap_or_default(),
            ports: spec
                .and_then(|s| s.ports.as_ref())
                .into_iter()
                .flatten()
                .map(|p| {
                    (
                        p.name.as_deref(),
                        p.port,
                        p.target_port.clone().unwrap_or(IntOrString::Int(p.port)),
                        p.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL),
                    )
                })
                .collect(),
        }
    }
}

impl OwnedChild for Service {
    const KIND: ChildKind = ChildKind::Endpoint;

    fn apply_desired(&mut self, app: &AppService) {
        let spec = self.spec.get_or_insert_with(ServiceSpec::default);
        spec.selector = Some(app_labels(app));
        spec.ports = service_ports(&app.spec.ports);
    }

    fn carry_forward(&mut self, original: &Self) {
        let Some(assigned) = original.spec.as_ref() else {
            return;
        };
        let spec = self.spec.get_or_insert_with(ServiceSpec::default);
        spec.cluster_ip = assigned.cluster_ip.clone();
        spec.cluster_ips = assigned.cluster_ips.clone();
    }

    fn owned_fields_equal(current: &Self, desired: &Self) -> bool {
        ServiceView::of(current) == ServiceView::of(desired)
    }
}
