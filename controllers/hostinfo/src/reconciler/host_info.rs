//! HostInfo reconcile cycle.

use super::capacity::{find_host, CpuCapacity, HostMatch};
use super::{Outcome, Reconciled, Reconciler};
use crate::error::ControllerError;
use crate::store::ResourceKey;
use std::future::Future;
use tracing::{debug, error, info, warn};

impl Reconciler {
    /// Reconcile the HostInfo identified by `key`.
    ///
    /// Reads the resource, enumerates the inventory, locates the named host
    /// and writes its CPU capacity into status. A missing resource or a host
    /// absent from the inventory is a success that writes nothing. A version
    /// conflict on the write is returned as an error; the caller re-invokes.
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Reconciled, ControllerError> {
        let result = self.reconcile_host_info(key).await;
        if let Err(e) = &result {
            error!("Reconciliation of HostInfo {} failed: {}", key, e);
        }
        result
    }

    /// Like [`Reconciler::reconcile`], abandoning the work as soon as
    /// `cancelled` completes.
    ///
    /// An already-completed `cancelled` wins over any progress, so no write
    /// happens after cancellation was observed.
    pub async fn reconcile_until<C>(&self, key: &ResourceKey, cancelled: C) -> Result<Reconciled, ControllerError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancelled => {
                warn!("Reconciliation of HostInfo {} cancelled", key);
                Err(ControllerError::Cancelled(format!("reconcile of HostInfo {} interrupted", key)))
            }
            result = self.reconcile(key) => result,
        }
    }

    async fn reconcile_host_info(&self, key: &ResourceKey) -> Result<Reconciled, ControllerError> {
        debug!("Reconciling HostInfo {}", key);

        let Some(host_info) = self.bounded(key, "HostInfo read", self.store.get(key)).await? else {
            debug!("HostInfo {} not found, assuming deleted", key);
            return Ok(Reconciled {
                outcome: Outcome::Deleted,
                requeue_after: None,
                duplicate_hosts: 0,
            });
        };

        let hosts = self
            .bounded(key, "host enumeration", async {
                self.inventory.enumerate_hosts().await.map_err(ControllerError::from)
            })
            .await?;

        let hostname = host_info.spec.hostname.as_str();
        let (host, duplicates) = match find_host(&hosts, hostname) {
            HostMatch::Found { host, duplicates } => (host, duplicates),
            HostMatch::Missing => {
                warn!(
                    "HostInfo {}: host {} not found among {} inventory hosts at {}, status left unchanged",
                    key,
                    hostname,
                    hosts.len(),
                    self.inventory.endpoint()
                );
                return Ok(self.settled(Outcome::NoMatch, 0));
            }
        };
        if duplicates > 0 {
            warn!(
                "HostInfo {}: {} inventory hosts are named {}, using the first one",
                key,
                duplicates + 1,
                hostname
            );
        }

        let status = CpuCapacity::of(host)?.to_status();

        if host_info.status.as_ref() == Some(&status) {
            debug!(
                "HostInfo {} already reports totalCPU={} freeCPU={}",
                key, status.total_cpu, status.free_cpu
            );
            return Ok(self.settled(Outcome::Unchanged(status), duplicates));
        }

        self.bounded(key, "status update", self.store.update_status(&host_info, &status))
            .await?;
        info!(
            "HostInfo {}: updated status totalCPU={} freeCPU={}",
            key, status.total_cpu, status.free_cpu
        );

        Ok(self.settled(Outcome::Updated(status), duplicates))
    }

    fn settled(&self, outcome: Outcome, duplicate_hosts: usize) -> Reconciled {
        Reconciled {
            outcome,
            requeue_after: self.settings.resync_interval,
            duplicate_hosts,
        }
    }

    /// Run one external call under the configured call timeout
    async fn bounded<T, F>(&self, key: &ResourceKey, what: &str, call: F) -> Result<T, ControllerError>
    where
        F: Future<Output = Result<T, ControllerError>>,
    {
        let limit = self.settings.call_timeout;
        tokio::time::timeout(limit, call).await.map_err(|elapsed| {
            ControllerError::Timeout(format!(
                "{} for HostInfo {} did not finish within {:?} ({})",
                what, key, limit, elapsed
            ))
        })?
    }
}
