//! AppService CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the AppService controller.

pub mod app_service;

pub use app_service::*;
