//! HostInfo resource store.
//!
//! The reconciler reads HostInfo objects and writes their status through the
//! `ResourceStore` trait. `KubeStore` is the Kubernetes implementation; tests
//! use an in-memory store.

use crate::error::ControllerError;
use crds::{HostInfo, HostInfoStatus};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use std::fmt;
use tracing::debug;

/// Identity of a HostInfo object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Namespace of the HostInfo
    pub namespace: String,
    /// Name of the HostInfo
    pub name: String,
}

impl ResourceKey {
    /// Key for `namespace/name`
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object delivered by the watch
    pub fn from_resource(host_info: &HostInfo) -> Result<Self, ControllerError> {
        let name = host_info.metadata.name.as_ref()
            .ok_or_else(|| ControllerError::InvalidConfig("HostInfo missing name".to_string()))?;
        let namespace = host_info.metadata.namespace.as_deref()
            .unwrap_or("default");
        Ok(Self::new(namespace, name.as_str()))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read and status-write access to HostInfo objects
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch the current object, `None` when it does not exist
    async fn get(&self, key: &ResourceKey) -> Result<Option<HostInfo>, ControllerError>;

    /// Write `status` onto `host_info`, guarded by the resourceVersion it was
    /// read at. Returns `ControllerError::Conflict` if the object changed since.
    async fn update_status(&self, host_info: &HostInfo, status: &HostInfoStatus) -> Result<(), ControllerError>;
}

/// `ResourceStore` backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Store talking to the API server through `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<HostInfo> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Merge patch for the status subresource.
    ///
    /// Carrying `metadata.resourceVersion` makes the API server reject the
    /// patch with 409 when the object moved on since it was read.
    pub(crate) fn status_patch(host_info: &HostInfo, status: &HostInfoStatus) -> Result<serde_json::Value, ControllerError> {
        let resource_version = host_info.resource_version().ok_or_else(|| {
            ControllerError::Conflict(format!(
                "HostInfo {} carries no resourceVersion, re-read required",
                host_info.name_any()
            ))
        })?;

        Ok(serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version,
            },
            "status": status,
        }))
    }
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<HostInfo>, ControllerError> {
        debug!("Fetching HostInfo {}", key);
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update_status(&self, host_info: &HostInfo, status: &HostInfoStatus) -> Result<(), ControllerError> {
        let key = ResourceKey::from_resource(host_info)?;
        let status_patch = Self::status_patch(host_info, status)?;

        let pp = PatchParams::default();
        match self.api(&key.namespace)
            .patch_status(&key.name, &pp, &Patch::Merge(&status_patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(ControllerError::Conflict(format!(
                "HostInfo {} was modified concurrently: {}",
                key, ae.message
            ))),
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }
}
