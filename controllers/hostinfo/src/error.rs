//! Controller-specific error types.
//!
//! This module defines error types specific to the HostInfo Controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use thiserror::Error;
use vcenter_client::InventoryError;

/// Errors that can occur in the HostInfo Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// vCenter inventory error
    #[error("vCenter error: {0}")]
    Inventory(#[from] InventoryError),

    /// Status write rejected because the resource changed since it was read
    #[error("Status update conflict: {0}")]
    Conflict(String),

    /// Inventory returned a host record that cannot be turned into capacity
    #[error("Malformed inventory record: {0}")]
    MalformedHost(String),

    /// External call did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Reconcile aborted because the controller is shutting down
    #[error("Reconciliation cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Listener or socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Short label used for the `kind` metric dimension
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::Kube(_) => "kube",
            ControllerError::Inventory(_) => "inventory",
            ControllerError::Conflict(_) => "conflict",
            ControllerError::MalformedHost(_) => "malformed_host",
            ControllerError::Timeout(_) => "timeout",
            ControllerError::Cancelled(_) => "cancelled",
            ControllerError::InvalidConfig(_) => "config",
            ControllerError::Metrics(_) => "metrics",
            ControllerError::Io(_) => "io",
            ControllerError::Watch(_) => "watch",
        }
    }
}
