//! HTTP routes for the auth server.

use crate::handlers::{self, AppState};
use crate::middleware::http_metrics_middleware;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the application routes.
///
/// - `/.well-known/jwks.json` - published verification keys
/// - `/api/auth/login` - email/password login, returns a token
/// - `/api/auth/introspection` - form-encoded token validation
/// - `/health`, `/ready`, `/metrics` - operational endpoints
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/.well-known/jwks.json", get(handlers::handle_get_jwks))
        .route("/api/auth/login", post(handlers::handle_login))
        .route(
            "/api/auth/introspection",
            post(handlers::handle_introspection),
        )
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware, outermost so it sees framework errors too
    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
