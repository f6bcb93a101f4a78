//! Read-only JSON operator API for courtside.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use courtside_core::MetricsSnapshot;
use courtside_sync::{LatestCycle, ReconciliationMetrics, Scheduler, SchedulerStatus, Shutdown};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "courtside-web";

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<ReconciliationMetrics>,
    pub latest: LatestCycle,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(
        metrics: Arc<ReconciliationMetrics>,
        latest: LatestCycle,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            metrics,
            latest,
            scheduler,
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics/reconciliation", get(metrics_handler))
        .route("/scheduler/status", get(scheduler_status_handler))
        .route("/cycles/latest", get(latest_cycle_handler))
        .with_state(Arc::new(state))
}

/// Binds `addr` and serves until `shutdown` is triggered.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: Shutdown) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    serve_listener(listener, state, shutdown).await
}

pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "operator api listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await
        .context("serving operator api")?;
    info!("operator api stopped");
    Ok(())
}

async fn health_handler() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn scheduler_status_handler(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

async fn latest_cycle_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.latest.get().await {
        Some(report) => Json(report).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "no cycle has completed yet".into(),
            }),
        )
            .into_response(),
    }
}
