//! AppService CRD
//!
//! Declares a single-container workload that the controller materialises as a
//! `Deployment` plus a `Service` of the same name.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Label key shared by the pod template, the Deployment selector and the
/// Service selector.
pub const APP_LABEL: &str = "app";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "app.example.com",
    version = "v1",
    kind = "AppService",
    plural = "appservices",
    shortname = "appsvc",
    namespaced,
    status = "AppServiceStatus",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceSpec {
    /// Replica count. Left unset on the Deployment when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Container image
    pub image: String,

    /// CPU/memory requests and limits
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,

    /// Environment variables, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<EnvVarSpec>,

    /// Exposed ports, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePortSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// Minimum resources requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceListSpec>,

    /// Maximum resources allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceListSpec>,
}

/// CPU and memory quantities, in Kubernetes quantity notation ("500m", "128Mi").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceListSpec {
    /// Returns true when neither quantity is set.
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSpec {
    /// Variable name, unique within the spec
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortSpec {
    /// Optional port name, unique within the spec when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Port exposed by the Service
    pub port: i32,

    /// Container port traffic is forwarded to (defaults to `port`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,

    #[serde(default)]
    pub protocol: PortProtocol,
}

impl ServicePortSpec {
    /// The container port this entry resolves to.
    pub fn effective_target_port(&self) -> i32 {
        self.target_port.unwrap_or(self.port)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
/// Transport protocol of a port.
///
/// Serializes in the upper-case form Kubernetes uses ("TCP", "UDP", "SCTP").
#[serde(rename_all = "UPPERCASE")]
pub enum PortProtocol {
    #[default]
    #[serde(alias = "tcp")]
    Tcp,

    #[serde(alias = "udp")]
    Udp,

    #[serde(alias = "sctp")]
    Sctp,
}

impl PortProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            PortProtocol::Tcp => "TCP",
            PortProtocol::Udp => "UDP",
            PortProtocol::Sctp => "SCTP",
        }
    }
}

/// Observed state, mirrored from the managed Deployment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_replicas: Option<i32>,

    /// Deployment generation the counts were observed at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<AppServiceCondition>,

    /// Last time the status was written by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceCondition {
    /// Condition type ("Available", "Progressing", ...)
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Reasons an `AppServiceSpec` is rejected before any child is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecValidationError {
    #[error("image must not be empty")]
    EmptyImage,

    #[error("replicas must not be negative (got {0})")]
    NegativeReplicas(i32),

    #[error("env var at index {0} has an empty name")]
    EmptyEnvName(usize),

    #[error("duplicate env var name: {0}")]
    DuplicateEnvName(String),

    #[error("port {0} is outside 1-65535")]
    PortOutOfRange(i32),

    #[error("duplicate port name: {0}")]
    DuplicatePortName(String),

    /// Kubernetes requires every Service port to be named once there are two or more.
    #[error("port {0} needs a name when more than one port is exposed")]
    UnnamedPort(i32),
}

impl AppServiceSpec {
    /// Checks the invariants the CRD schema cannot express.
    pub fn validate(&self) -> Result<(), SpecValidationError> {
        if self.image.trim().is_empty() {
            return Err(SpecValidationError::EmptyImage);
        }
        if let Some(replicas) = self.replicas {
            if replicas < 0 {
                return Err(SpecValidationError::NegativeReplicas(replicas));
            }
        }

        let mut env_names = HashSet::new();
        for (i, env) in self.envs.iter().enumerate() {
            if env.name.is_empty() {
                return Err(SpecValidationError::EmptyEnvName(i));
            }
            if !env_names.insert(env.name.as_str()) {
                return Err(SpecValidationError::DuplicateEnvName(env.name.clone()));
            }
        }

        let multi_port = self.ports.len() > 1;
        let mut port_names = HashSet::new();
        for port in &self.ports {
            for value in [port.port, port.effective_target_port()] {
                if !(1..=65535).contains(&value) {
                    return Err(SpecValidationError::PortOutOfRange(value));
                }
            }
            let name = port.name.as_deref().filter(|n| !n.is_empty());
            if multi_port && name.is_none() {
                return Err(SpecValidationError::UnnamedPort(port.port));
            }
            if let Some(name) = name {
                if !port_names.insert(name) {
                    return Err(SpecValidationError::DuplicatePortName(name.to_string()));
                }
            }
        }

        Ok(())
    }
}
