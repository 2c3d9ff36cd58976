//! Reconciliation logic for HostInfo resources.
//!
//! - `host_info`: the reconcile cycle (fetch, enumerate, match, compute, commit)
//! - `capacity`: host matching and CPU capacity arithmetic
//!
//! The reconciler holds no mutable state. Retry timing is decided by the
//! caller from the returned `Reconciled` value or error.

mod capacity;
mod host_info;


use crate::store::ResourceStore;
use crds::HostInfoStatus;
use std::time::Duration;
use vcenter_client::InventoryClientTrait;

/// Timing knobs for the reconcile cycle
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerSettings {
    /// Requeue delay after a successful reconcile of an existing resource
    pub resync_interval: Option<Duration>,
    /// Upper bound for each external call
    pub call_timeout: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            resync_interval: Some(Duration::from_secs(300)),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// What a successful reconcile did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The resource no longer exists
    Deleted,
    /// No inventory host carries the requested name; status left as is
    NoMatch,
    /// Computed status equals the stored one; nothing written
    Unchanged(HostInfoStatus),
    /// Status written
    Updated(HostInfoStatus),
}

impl Outcome {
    /// Label for the `outcome` metric dimension
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Deleted => "deleted",
            Outcome::NoMatch => "no_match",
            Outcome::Unchanged(_) => "unchanged",
            Outcome::Updated(_) => "updated",
        }
    }
}

/// Result of a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// What the reconcile did
    pub outcome: Outcome,
    /// When to look at the resource again, `None` to wait for the next change
    pub requeue_after: Option<Duration>,
    /// Further inventory hosts sharing the matched name
    pub duplicate_hosts: usize,
}

/// HostInfo reconciler
pub struct Reconciler {
    inventory: Box<dyn InventoryClientTrait + Send + Sync>,
    store: Box<dyn ResourceStore>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    /// Reconciler reading hosts from `inventory` and writing status through `store`
    pub fn new(
        inventory: Box<dyn InventoryClientTrait + Send + Sync>,
        store: Box<dyn ResourceStore>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            inventory,
            store,
            settings,
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("inventory", &self.inventory.endpoint())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
