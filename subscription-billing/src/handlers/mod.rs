//! HTTP handlers for subscription-billing.

pub mod billing;
pub mod payments;
pub mod subscriptions;

use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "subscription-billing",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness probe: the subscription file must be readable.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.load_all().await {
        Ok(subscriptions) => {
            tracing::debug!(count = subscriptions.len(), "Readiness check passed");
            (StatusCode::OK, Json(json!({ "status": "ready" })))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
