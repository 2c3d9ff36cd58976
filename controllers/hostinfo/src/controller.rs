//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the vCenter
//! client, the Kubernetes store, the reconciler and the metrics listener
//! together, and runs the HostInfo watcher until shutdown.

use crate::backoff::BackoffRegistry;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics, ProbeState};
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::store::KubeStore;
use crate::watcher::{Context, WatchSettings, Watcher};
use crds::HostInfo;
use kube::{Api, Client};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vcenter_client::{ClientOptions, VCenterClient};

/// Main controller for HostInfo resources.
pub struct Controller {
    host_info_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing HostInfo Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        // Create vCenter client
        let options = ClientOptions {
            insecure: config.vcenter_insecure,
            api_release: config.api_release.clone(),
            timeout: config.call_timeout,
            max_concurrent_requests: config.max_concurrent_requests,
        };
        let vcenter_client = VCenterClient::new(
            &config.vcenter_url,
            config.vcenter_username.clone(),
            config.vcenter_password.clone(),
            options,
        )?;

        // Validate credentials and connectivity before proceeding
        info!("Logging in to vCenter at {}...", vcenter_client.endpoint());
        vcenter_client.login().await.map_err(|e| {
            error!("Failed to log in to vCenter: {}", e);
            error!("Please ensure:");
            error!("  1. VC_USERNAME and VC_PASSWORD are set correctly");
            error!("  2. vCenter is reachable at {}", config.vcenter_url);
            error!("  3. VC_INSECURE=true is set if vCenter uses a self-signed certificate");
            ControllerError::Inventory(e)
        })?;
        info!("vCenter session established");

        // Metrics
        let registry = Arc::new(Registry::new());
        let metrics = Metrics::new(&registry)?;
        let probe_state = ProbeState::new(Arc::clone(&registry));

        // Shutdown signal shared with in-flight reconciles
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown requested, cancelling in-flight reconciliations");
            // Receivers only gone once everything has stopped
            let _ = shutdown_tx.send(true);
        });

        let reconciler = Reconciler::new(
            Box::new(vcenter_client),
            Box::new(KubeStore::new(kube_client.clone())),
            ReconcilerSettings {
                resync_interval: Some(config.resync_interval),
                call_timeout: config.call_timeout,
            },
        );
        let context = Arc::new(Context {
            reconciler,
            metrics,
            backoff: BackoffRegistry::default(),
            shutdown: shutdown_rx,
        });

        let api: Api<HostInfo> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client, ns),
            None => Api::all(kube_client),
        };

        let watcher = Watcher::new(
            api,
            context,
            WatchSettings {
                debounce: config.debounce,
                concurrency: config.concurrency,
            },
            Arc::clone(&probe_state.ready),
        );

        let host_info_watcher = tokio::spawn(async move { watcher.watch_host_infos().await });
        let metrics_server = tokio::spawn(metrics::serve(config.metrics_addr, probe_state));

        Ok(Self {
            host_info_watcher,
            metrics_server,
        })
    }

    /// Runs the controller until the watcher stops or a task fails.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("HostInfo Controller running");

        let Self {
            host_info_watcher,
            metrics_server,
        } = self;

        tokio::select! {
            result = host_info_watcher => {
                match result {
                    Ok(Ok(())) => {
                        info!("HostInfo watcher completed");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        error!("HostInfo watcher failed: {}", e);
                        Err(e)
                    }
                    Err(e) => {
                        error!("HostInfo watcher task panicked: {}", e);
                        Err(ControllerError::Watch(e.to_string()))
                    }
                }
            }
            result = metrics_server => {
                match result {
                    Ok(Ok(())) => {
                        warn!("Metrics server stopped");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        error!("Metrics server failed: {}", e);
                        Err(e)
                    }
                    Err(e) => {
                        error!("Metrics server task panicked: {}", e);
                        Err(ControllerError::Watch(e.to_string()))
                    }
                }
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
