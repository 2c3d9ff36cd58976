//! Prometheus metrics and health probes.
//!
//! Served on one listener:
//! - `GET /metrics`: Prometheus text format
//! - `GET /healthz`: liveness, always ok
//! - `GET /readyz`: ok once the controller stream is running

use crate::error::ControllerError;
use crate::reconciler::Reconciled;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Reconcile metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Successful reconciles by outcome
    pub reconciliations_total: IntCounterVec,
    /// Failed reconciles by error kind
    pub reconcile_errors_total: IntCounterVec,
    /// Inventory hosts shadowed by an earlier host with the same name
    pub duplicate_hosts_total: IntCounter,
    /// Wall time of a reconcile
    pub reconcile_duration_seconds: Histogram,
}

impl Metrics {
    /// Create and register the reconcile metrics
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let reconciliations_total = IntCounterVec::new(
            Opts::new("hostinfo_reconciliations_total", "Successful HostInfo reconciliations"),
            &["outcome"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let reconcile_errors_total = IntCounterVec::new(
            Opts::new("hostinfo_reconcile_errors_total", "Failed HostInfo reconciliations"),
            &["kind"],
        )?;
        registry.register(Box::new(reconcile_errors_total.clone()))?;

        let duplicate_hosts_total = IntCounter::new(
            "hostinfo_duplicate_hosts_total",
            "Inventory hosts ignored because an earlier host has the same name",
        )?;
        registry.register(Box::new(duplicate_hosts_total.clone()))?;

        let reconcile_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("hostinfo_reconcile_duration_seconds", "HostInfo reconcile duration")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        Ok(Self {
            reconciliations_total,
            reconcile_errors_total,
            duplicate_hosts_total,
            reconcile_duration_seconds,
        })
    }

    /// Record the result of one reconcile
    pub fn observe(&self, result: &Result<Reconciled, ControllerError>, elapsed: Duration) {
        self.reconcile_duration_seconds.observe(elapsed.as_secs_f64());
        match result {
            Ok(reconciled) => {
                self.reconciliations_total
                    .with_label_values(&[reconciled.outcome.label()])
                    .inc();
                self.duplicate_hosts_total
                    .inc_by(u64::try_from(reconciled.duplicate_hosts).unwrap_or(u64::MAX));
            }
            Err(e) => {
                self.reconcile_errors_total.with_label_values(&[e.kind()]).inc();
            }
        }
    }
}

/// Shared state of the probe listener
#[derive(Debug, Clone)]
pub struct ProbeState {
    pub registry: Arc<Registry>,
    /// Set once the controller stream is running
    pub ready: Arc<AtomicBool>,
}

impl ProbeState {
    /// Probe state serving `registry`, not ready until the watcher says so
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }
}

async fn metrics_handler(State(state): State<ProbeState>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ProbeState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Router for the metrics and probe endpoints
pub fn router(state: ProbeState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Serve the probe router on `addr` until the process exits
pub async fn serve(addr: SocketAddr, state: ProbeState) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics and probes on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
