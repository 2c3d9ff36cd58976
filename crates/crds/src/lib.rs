//! HostInfo CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the HostInfo controller.

pub mod host_info;

pub use host_info::*;
