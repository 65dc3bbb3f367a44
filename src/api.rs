// src/api.rs
//! Operational HTTP surface: liveness and Prometheus exposition.
//!
//! Served concurrently with the reconciliation loop; both only issue
//! independent single-key store operations, so no extra locking is needed.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::store::SeenStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SeenStore>,
    pub metrics: PrometheusHandle,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// 200 when the seen store answers a liveness probe, 5xx otherwise.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "All is well!").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed to reach the seen store");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unable to connect to the seen store",
            )
                .into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
