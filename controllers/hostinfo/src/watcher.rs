//! HostInfo watcher.
//!
//! Drives the reconciler from a `kube_runtime::Controller`: watch events,
//! requeues and resyncs all funnel into `reconcile`, and failed reconciles
//! are requeued by `error_policy`. Per-key serialization, debounce and the
//! concurrency limit come from the runtime.

use crate::backoff::BackoffRegistry;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciled, Reconciler};
use crate::store::ResourceKey;
use crds::HostInfo;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::{controller::{Action, Config as ControllerConfig}, watcher, Controller};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Requeue delay after a status write conflict; the read is simply redone
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Shared state handed to every reconcile
pub struct Context {
    pub reconciler: Reconciler,
    pub metrics: Metrics,
    pub backoff: BackoffRegistry,
    /// Flips to `true` when the process is asked to stop
    pub shutdown: watch::Receiver<bool>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("reconciler", &self.reconciler)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Resolves once shutdown was requested.
///
/// Never resolves if the sender is gone without having requested shutdown.
pub async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Map a successful reconcile to the runtime's requeue action
pub fn action_for(reconciled: &Reconciled) -> Action {
    match reconciled.requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Delay before retrying a failed reconcile of `key`
pub fn requeue_delay(error: &ControllerError, backoff: &BackoffRegistry, key: &str) -> Duration {
    match error {
        ControllerError::Conflict(_) => CONFLICT_REQUEUE,
        _ => backoff.next_backoff(key),
    }
}

/// Reconcile entry point registered with the runtime
pub async fn reconcile(host_info: Arc<HostInfo>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = ResourceKey::from_resource(&host_info)?;
    let started = Instant::now();

    let result = ctx
        .reconciler
        .reconcile_until(&key, shutdown_requested(ctx.shutdown.clone()))
        .await;
    ctx.metrics.observe(&result, started.elapsed());

    let reconciled = result?;
    ctx.backoff.reset(&key.to_string());
    debug!("HostInfo {} reconciled: {}", key, reconciled.outcome.label());
    Ok(action_for(&reconciled))
}

/// Requeue policy for failed reconciles
pub fn error_policy(host_info: Arc<HostInfo>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = ResourceKey::from_resource(&host_info)
        .map(|key| key.to_string())
        .unwrap_or_else(|_| host_info.name_any());
    let delay = requeue_delay(error, &ctx.backoff, &key);
    warn!("Requeueing HostInfo {} in {:?} after error: {}", key, delay, error);
    Action::requeue(delay)
}

/// Runtime tuning for the watch
#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    /// Quiet period before a changed resource is reconciled
    pub debounce: Duration,
    /// Resources reconciled in parallel, 0 for unbounded
    pub concurrency: u16,
}

/// Watches HostInfo resources and feeds them to the reconciler.
pub struct Watcher {
    api: Api<HostInfo>,
    context: Arc<Context>,
    settings: WatchSettings,
    ready: Arc<AtomicBool>,
}

impl Watcher {
    /// Watcher over `api`; `ready` is set while the controller stream runs
    pub fn new(api: Api<HostInfo>, context: Arc<Context>, settings: WatchSettings, ready: Arc<AtomicBool>) -> Self {
        Self {
            api,
            context,
            settings,
            ready,
        }
    }

    /// Run the controller stream until shutdown.
    pub async fn watch_host_infos(&self) -> Result<(), ControllerError> {
        info!(
            "Starting HostInfo watcher (debounce {:?}, concurrency {})",
            self.settings.debounce, self.settings.concurrency
        );

        let controller_config = ControllerConfig::default()
            .debounce(self.settings.debounce)
            .concurrency(self.settings.concurrency);

        let stream = Controller::new(self.api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::clone(&self.context));

        self.ready.store(true, Ordering::SeqCst);
        stream
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("Reconciled HostInfo {}: {:?}", obj, action),
                    Err(e) => error!("HostInfo controller error: {}", e),
                }
            })
            .await;
        self.ready.store(false, Ordering::SeqCst);

        info!("HostInfo watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{Outcome, ReconcilerSettings};
    use crate::test_utils::{create_test_host_info, InMemoryStore};
    use crds::HostInfoStatus;
    use prometheus::Registry;
    use vcenter_client::{HostSummary, MockInventoryClient};

    fn context(inventory: &MockInventoryClient, store: &InMemoryStore) -> (Arc<Context>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let reconciler = Reconciler::new(
            Box::new(inventory.clone()),
            Box::new(store.clone()),
            ReconcilerSettings::default(),
        );
        let ctx = Context {
            reconciler,
            metrics: Metrics::new(&Registry::new()).unwrap(),
            backoff: BackoffRegistry::default(),
            shutdown: rx,
        };
        (Arc::new(ctx), tx)
    }

    #[test]
    fn test_action_for_requeue() {
        let reconciled = Reconciled {
            outcome: Outcome::NoMatch,
            requeue_after: Some(Duration::from_secs(300)),
            duplicate_hosts: 0,
        };
        assert_eq!(action_for(&reconciled), Action::requeue(Duration::from_secs(300)));
    }

    #[test]
    fn test_action_for_deleted_waits_for_change() {
        let reconciled = Reconciled {
            outcome: Outcome::Deleted,
            requeue_after: None,
            duplicate_hosts: 0,
        };
        assert_eq!(action_for(&reconciled), Action::await_change());
    }

    #[test]
    fn test_conflict_requeues_quickly() {
        let backoff = BackoffRegistry::default();
        let conflict = ControllerError::Conflict("stale".to_string());
        assert_eq!(requeue_delay(&conflict, &backoff, "infra/esx-01"), CONFLICT_REQUEUE);
        assert_eq!(requeue_delay(&conflict, &backoff, "infra/esx-01"), CONFLICT_REQUEUE);
    }

    #[test]
    fn test_other_errors_back_off() {
        let backoff = BackoffRegistry::default();
        let error = ControllerError::Timeout("enumeration".to_string());
        let delays: Vec<u64> = (0..4)
            .map(|_| requeue_delay(&error, &backoff, "infra/esx-01").as_secs())
            .collect();
        assert_eq!(delays, vec![5, 5, 10, 15]);
    }

    #[tokio::test]
    async fn test_reconcile_success_resets_backoff() {
        let inventory = MockInventoryClient::with_hosts(vec![HostSummary::new("esx01.lab", 2400, 16, 9600)]);
        let store = InMemoryStore::new();
        let host_info = create_test_host_info("infra", "esx-01", "esx01.lab");
        let key = store.insert(host_info.clone());
        let (ctx, _tx) = context(&inventory, &store);

        ctx.backoff.next_backoff("infra/esx-01");
        ctx.backoff.next_backoff("infra/esx-01");

        let action = reconcile(Arc::new(host_info), Arc::clone(&ctx)).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(300)));
        assert_eq!(store.status_of(&key), Some(HostInfoStatus { total_cpu: 38400, free_cpu: 28800 }));
        assert_eq!(ctx.backoff.next_backoff("infra/esx-01"), Duration::from_secs(5));
        assert_eq!(
            ctx.metrics.reconciliations_total.with_label_values(&["updated"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_reconcile_failure_counts_error_kind() {
        let inventory = MockInventoryClient::new();
        inventory.fail_with("vCenter unavailable");
        let store = InMemoryStore::new();
        let host_info = create_test_host_info("infra", "esx-01", "esx01.lab");
        store.insert(host_info.clone());
        let (ctx, _tx) = context(&inventory, &store);

        let result = reconcile(Arc::new(host_info.clone()), Arc::clone(&ctx)).await;
        let error = result.unwrap_err();
        assert!(matches!(error, ControllerError::Inventory(_)));
        assert_eq!(
            ctx.metrics.reconcile_errors_total.with_label_values(&["inventory"]).get(),
            1
        );

        let action = error_policy(Arc::new(host_info), &error, Arc::clone(&ctx));
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_reconcile_after_shutdown_is_cancelled() {
        let inventory = MockInventoryClient::with_hosts(vec![HostSummary::new("esx01.lab", 2400, 16, 9600)]);
        let store = InMemoryStore::new();
        let host_info = create_test_host_info("infra", "esx-01", "esx01.lab");
        let key = store.insert(host_info.clone());
        let (ctx, tx) = context(&inventory, &store);

        tx.send(true).unwrap();
        let result = reconcile(Arc::new(host_info), ctx).await;

        assert!(matches!(result, Err(ControllerError::Cancelled(_))));
        assert_eq!(store.status_of(&key), None);
    }

    #[tokio::test]
    async fn test_shutdown_requested_pends_without_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(20), shutdown_requested(rx)).await;
        assert!(waited.is_err());
    }
}
