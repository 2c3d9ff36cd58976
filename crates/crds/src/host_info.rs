//! HostInfo CRD
//!
//! Names a vSphere host whose CPU capacity the controller mirrors into status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// HostInfoSpec defines the host to look up in the vCenter inventory.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "topology.corinternal.com",
    version = "v1",
    kind = "HostInfo",
    plural = "hostinfoes",
    namespaced,
    status = "HostInfoStatus",
    printcolumn = r#"{"name":"Hostname","type":"string","jsonPath":".spec.hostname"}"#,
    printcolumn = r#"{"name":"Total CPU","type":"integer","jsonPath":".status.totalCPU"}"#,
    printcolumn = r#"{"name":"Free CPU","type":"integer","jsonPath":".status.freeCPU"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HostInfoSpec {
    /// Host name as configured in vCenter (exact, case-sensitive match)
    pub hostname: String,
}

/// HostInfoStatus holds the capacity observed for the matched host.
///
/// Absent until the first successful reconcile. Values are MHz: clock speed
/// per core multiplied by logical cores, and that total minus live usage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct HostInfoStatus {
    /// Total CPU capacity in MHz
    #[serde(rename = "totalCPU", default)]
    pub total_cpu: i64,

    /// Unused CPU capacity in MHz, negative when the host is overcommitted
    #[serde(rename = "freeCPU", default)]
    pub free_cpu: i64,
}
