//! Unit tests for the Service builder, carry-forward and comparator

#[cfg(test)]
mod tests {
    use super::super::child::OwnedChild;
    use crate::test_utils::{test_app_service, test_spec};
    use crds::{PortProtocol, ServicePortSpec};
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use std::collections::BTreeMap;

    fn built() -> Service {
        let mut service = Service::named("prod", "web");
        service.apply_desired(&test_app_service("web", "prod", test_spec()));
        service
    }

    /// Service as stored after the API server allocated `ip`.
    fn allocated(ip: &str) -> Service {
        let mut service = built();
        let spec = service.spec.as_mut().unwrap();
        spec.cluster_ip = Some(ip.to_string());
        spec.cluster_ips = Some(vec![ip.to_string()]);
        spec.type_ = Some("ClusterIP".to_string());
        service
    }

    #[test]
    fn test_projects_ports_and_selector() {
        let service = built();
        let spec = service.spec.as_ref().unwrap();

        assert_eq!(
            spec.selector,
            Some(BTreeMap::from([("app".to_string(), "web".to_string())]))
        );
        let ports = spec.ports.as_ref().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("http"));
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(8080)));
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert!(spec.cluster_ip.is_none());
    }

    #[test]
    fn test_absent_ports_give_no_service_ports() {
        let mut spec = test_spec();
        spec.ports.clear();
        let mut service = Service::named("prod", "web");
        service.apply_desired(&test_app_service("web", "prod", spec));
        assert!(service.spec.unwrap().ports.is_none());
    }

    #[test]
    fn test_cluster_ip_carried_forward_on_port_change() {
        let current = allocated("10.0.0.5");

        let mut spec = test_spec();
        spec.ports[0].port = 8443;
        let mut desired = Service::named("prod", "web");
        desired.apply_desired(&test_app_service("web", "prod", spec));
        desired.carry_forward(&current);

        let desired_spec = desired.spec.as_ref().unwrap();
        assert_eq!(desired_spec.cluster_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(desired_spec.cluster_ips, Some(vec!["10.0.0.5".to_string()]));
        assert_eq!(desired_spec.ports.as_ref().unwrap()[0].port, 8443);
        assert!(!Service::owned_fields_equal(&current, &desired));
    }

    #[test]
    fn test_cluster_ip_is_not_an_owned_field() {
        let current = allocated("10.0.0.5");
        let desired = built();
        assert!(Service::owned_fields_equal(&current, &desired));
    }

    #[test]
    fn test_server_defaults_compare_equal() {
        let desired = built();
        let mut current = desired.clone();
        let port = &mut current.spec.as_mut().unwrap().ports.as_mut().unwrap()[0];
        port.protocol = None;

        assert!(Service::owned_fields_equal(&current, &desired));

        let mut spec = test_spec();
        spec.ports[0].target_port = None;
        let mut defaulted = Service::named("prod", "web");
        defaulted.apply_desired(&test_app_service("web", "prod", spec));
        let mut stored = defaulted.clone();
        stored.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].target_port = None;
        assert!(Service::owned_fields_equal(&stored, &defaulted));
    }

    #[test]
    fn test_protocol_change_is_drift() {
        let current = built();
        let mut spec = test_spec();
        spec.ports[0] = ServicePortSpec {
            protocol: PortProtocol::Udp,
            ..spec.ports[0].clone()
        };
        let mut desired = current.clone();
        desired.apply_desired(&test_app_service("web", "prod", spec));
        assert!(!Service::owned_fields_equal(&current, &desired));
    }
}
