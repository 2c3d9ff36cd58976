//! InventoryClient trait for mocking
//!
//! Abstracts the vCenter client so the reconciler can be unit tested
//! against an in-memory inventory.

use crate::error::InventoryError;
use crate::models::HostSummary;

/// Read-only view of the virtualization inventory
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait InventoryClientTrait: Send + Sync {
    /// Endpoint the client talks to, for logging
    fn endpoint(&self) -> &str;

    /// List every host known to the inventory, in inventory order
    async fn enumerate_hosts(&self) -> Result<Vec<HostSummary>, InventoryError>;
}
