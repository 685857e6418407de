//! Ops HTTP server: metrics, assessment, and the admin reset endpoint.
//!
//! Runs on a separate tokio task, bound to its own port, so operational
//! traffic never competes with (or is admission-limited like) the books API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info, warn};

use crate::admission::AdmissionControl;
use crate::db::Database;
use crate::telemetry::{MetricsCollector, PromExporter, SystemSampler, assess};

/// Everything the ops handlers read. Snapshots are taken per request;
/// nothing here caches.
#[derive(Clone)]
pub struct OpsState {
    pub db: Database,
    pub collector: Arc<MetricsCollector>,
    pub admission: Arc<AdmissionControl>,
    pub exporter: Arc<PromExporter>,
    pub sampler: Arc<SystemSampler>,
    /// Trailing window for the stats endpoints.
    pub window: Duration,
    /// false in production, where remote state clearing is refused.
    pub reset_enabled: bool,
}

pub fn router(state: OpsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_json))
        .route("/metrics/prometheus", get(metrics_prometheus))
        .route("/assessment", get(assessment))
        .route("/admin/reset", post(admin_reset))
        .with_state(state)
}

/// Run the ops HTTP server. Long-running; spawn it in the background.
pub async fn run_ops_server(port: u16, state: OpsState) {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Ops HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind ops server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Ops server error: {}", e);
    }
}

/// Handler for GET /metrics - the full JSON snapshot.
async fn metrics_json(State(state): State<OpsState>) -> Json<serde_json::Value> {
    let perf = state.collector.performance(state.window);
    let db = state.db.sample_stats().await;
    let sys = state.sampler.sample();
    let summary = state.collector.summary();
    Json(json!({
        "requests": perf,
        "database": db,
        "system": sys,
        "collector": summary,
    }))
}

/// Handler for GET /metrics/prometheus - text exposition format.
async fn metrics_prometheus(State(state): State<OpsState>) -> String {
    let perf = state.collector.performance(state.window);
    let db = state.db.sample_stats().await;
    let sys = state.sampler.sample();
    let summary = state.collector.summary();
    let clients = state.collector.client_request_counts(state.window);
    state.exporter.render(&perf, &db, &sys, &summary, &clients)
}

/// Handler for GET /assessment - health verdict over the same snapshot.
async fn assessment(State(state): State<OpsState>) -> Json<serde_json::Value> {
    let perf = state.collector.performance(state.window);
    let db = state.db.sample_stats().await;
    let sys = state.sampler.sample();
    let verdict = assess(&perf, &db, &sys);
    Json(serde_json::to_value(verdict).unwrap_or_else(|_| json!({})))
}

/// Handler for POST /admin/reset - clears collector state and all buckets.
async fn admin_reset(State(state): State<OpsState>) -> Response {
    if !state.reset_enabled {
        warn!("Refused admin reset: disabled in this environment");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "forbidden",
                "message": "reset is disabled in production",
            })),
        )
            .into_response();
    }
    state.collector.reset();
    state.admission.reset_all();
    info!("Admin reset: cleared collector state and admission buckets");
    Json(json!({ "status": "reset" })).into_response()
}
