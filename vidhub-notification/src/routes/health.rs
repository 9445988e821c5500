use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use vidhub_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

/// Liveness plus a check of every backing service in use.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let mut checks = Vec::with_capacity(2);

    checks.push(match state.store.ping() {
        Ok(()) => HealthCheck::healthy("store"),
        Err(e) => HealthCheck::unhealthy("store", e.to_string()),
    });

    if let Some(redis) = &state.redis {
        checks.push(match redis.ping().await {
            Ok(()) => HealthCheck::healthy("redis"),
            Err(e) => HealthCheck::unhealthy("redis", e.to_string()),
        });
    }

    let response = HealthResponse::healthy("vidhub-notification", env!("CARGO_PKG_VERSION"))
        .with_checks(checks);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
