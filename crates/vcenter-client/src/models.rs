//! vim25 JSON API models
//!
//! Only the properties the controller reads are modelled; everything else in
//! the vCenter payloads is ignored during deserialization.

use serde::{Deserialize, Serialize};

/// Reference to a vSphere managed object (e.g. `HostSystem:host-10`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedObjectReference {
    #[serde(rename = "_typeName", default = "ManagedObjectReference::type_name")]
    pub type_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectReference {
    fn type_name() -> String {
        "ManagedObjectReference".to_string()
    }

    /// Build a reference of the given managed object type
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: Self::type_name(),
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// Subset of `ServiceInstance.content`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: ManagedObjectReference,
    #[serde(default)]
    pub session_manager: Option<ManagedObjectReference>,
    #[serde(default)]
    pub view_manager: Option<ManagedObjectReference>,
}

/// Body of `SessionManager.Login`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub user_name: &'a str,
    pub password: &'a str,
}

/// Body of `ViewManager.CreateContainerView`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerViewRequest<'a> {
    pub container: &'a ManagedObjectReference,
    #[serde(rename = "type")]
    pub types: Vec<&'a str>,
    pub recursive: bool,
}

/// `HostSystem.summary` (vim.host.Summary)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostListSummary {
    #[serde(default)]
    pub config: Option<HostConfigSummary>,
    #[serde(default)]
    pub hardware: Option<HostHardwareSummary>,
    #[serde(default)]
    pub quick_stats: Option<HostQuickStats>,
}

/// `HostSystem.summary.config`, the part carrying the inventory name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfigSummary {
    /// Host name as shown in the vCenter inventory
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostHardwareSummary {
    /// Clock speed of a single core in MHz
    pub cpu_mhz: i64,
    pub num_cpu_cores: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostQuickStats {
    /// Aggregate CPU usage across all cores in MHz
    #[serde(default)]
    pub overall_cpu_usage: Option<i64>,
}

/// Flattened host record handed to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSummary {
    /// Configured host name
    pub name: String,
    /// Clock speed per core in MHz
    pub cpu_mhz: i64,
    /// Logical core count
    pub num_cpu_cores: i64,
    /// Current aggregate CPU consumption in MHz
    pub overall_cpu_usage: i64,
}

impl HostSummary {
    /// Summary of a connected host named `name`
    pub fn new(name: impl Into<String>, cpu_mhz: i64, num_cpu_cores: i64, overall_cpu_usage: i64) -> Self {
        Self {
            name: name.into(),
            cpu_mhz,
            num_cpu_cores,
            overall_cpu_usage,
        }
    }
}

impl HostListSummary {
    /// Flatten into a [`HostSummary`].
    ///
    /// Returns `None` for hosts that report no config or hardware section,
    /// which is what vCenter returns for disconnected hosts. Missing quick
    /// stats read as zero usage.
    pub fn into_host_summary(self) -> Option<HostSummary> {
        let config = self.config?;
        let hardware = self.hardware?;
        let usage = self
            .quick_stats
            .and_then(|stats| stats.overall_cpu_usage)
            .unwrap_or(0);

        Some(HostSummary {
            name: config.name,
            cpu_mhz: hardware.cpu_mhz,
            num_cpu_cores: hardware.num_cpu_cores,
            overall_cpu_usage: usage,
        })
    }
}
