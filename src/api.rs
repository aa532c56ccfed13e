//! HTTP query endpoint
//!
//! # Endpoints
//!
//! - `GET /api/buses` - Current snapshot as a JSON array of vehicle records
//! - `GET /health` - Poll loop status
//!
//! Handlers only read the snapshot store and poll statistics; they never
//! wait on the upstream feed.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    errors::TrackerError,
    poller::PollStats,
    store::{Snapshot, SnapshotStore},
};

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub stats: Arc<PollStats>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub vehicles: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Loaded snapshot rendered as a JSON array of its records
struct SnapshotBody(Arc<Snapshot>);

impl Serialize for SnapshotBody {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(&self.0.records)
    }
}

/// Build the axum router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/buses", get(list_buses))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Serve the API on `listener` until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), TrackerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("API listening on http://{}", addr);
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("API stopped");
    Ok(())
}

async fn list_buses(State(state): State<AppState>) -> Json<SnapshotBody> {
    Json(SnapshotBody(state.store.read_all()))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.store.read_all();
    let stats = state.stats.snapshot();

    let status = if stats.consecutive_failures > 0 {
        "degraded"
    } else if snapshot.fetched_at.is_none() {
        "starting"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        vehicles: snapshot.len(),
        fetched_at: snapshot.fetched_at,
        last_success: stats.last_success,
        cycles: stats.cycles,
        failures: stats.failures,
        consecutive_failures: stats.consecutive_failures,
        last_error: stats.last_error,
    })
}
