//! Health check handlers.
//!
//! - `/health`: Liveness probe, returns OK if the process is running
//! - `/ready`: Readiness probe, checks the store and that a key can sign

use super::auth_handler::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Readiness probe response body.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe handler.
///
/// Does not check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when the store answers and an active signing key exists,
/// 503 otherwise. Error messages stay generic; details go to the log.
#[tracing::instrument(skip_all, name = "auth.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(target: "auth.health", error = %e, "Readiness check failed: store error");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                store: Some("unhealthy"),
                signing_key: None,
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    match state.store.get_active_key().await {
        Ok(Some(_)) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                store: Some("healthy"),
                signing_key: Some("active"),
                error: None,
            }),
        ),
        Ok(None) => {
            tracing::warn!(target: "auth.health", "Readiness check failed: no active signing key");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    store: Some("healthy"),
                    signing_key: Some("missing"),
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            )
        }
        Err(e) => {
            tracing::warn!(target: "auth.health", error = %e, "Readiness check failed: key lookup error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    store: Some("unhealthy"),
                    signing_key: None,
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            )
        }
    }
}
