//! Metrics definitions for the auth server
//!
//! All metrics follow Prometheus naming conventions:
//! - `auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: success, error (plus `superseded` for rotation)
//! - `result`: active, inactive, error
//! - `reason`: bounded by `TokenRejection::as_str`
//! - `kind`: bounded by the anomaly detectors in `repositories`
//! - `path`: normalized to the known routes

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder.
///
/// Can succeed only once per process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("auth_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // bcrypt dominates issuance latency
        .set_buckets_for_metric(
            Matcher::Prefix("auth_token_issuance".to_string()),
            &[0.010, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `auth_token_issuance_duration_seconds`, `auth_token_issuance_total`
/// Labels: `status`
pub fn record_token_issuance(status: &str, duration: Duration) {
    histogram!("auth_token_issuance_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("auth_token_issuance_total", "status" => status.to_string()).increment(1);
}

/// Record an introspection verdict
///
/// Metric: `auth_token_introspection_total`
/// Labels: `result`, `reason`
pub fn record_token_introspection(result: &str, reason: Option<&str>) {
    let reason = reason.unwrap_or("none");
    counter!("auth_token_introspection_total", "result" => result.to_string(), "reason" => reason.to_string())
        .increment(1);
}

// ============================================================================
// Key Management Metrics
// ============================================================================

/// Record key rotation event
///
/// Metric: `auth_key_rotation_total`
/// Labels: `status`
pub fn record_key_rotation(status: &str) {
    counter!("auth_key_rotation_total", "status" => status.to_string()).increment(1);
}

/// Update signing key age gauge
///
/// Metric: `auth_signing_key_age_days`
pub fn set_signing_key_age_days(age_days: f64) {
    gauge!("auth_signing_key_age_days").set(age_days);
}

/// Update active signing keys count
///
/// Metric: `auth_active_signing_keys`
///
/// Anything other than 1 means the service cannot issue or the store is
/// inconsistent.
pub fn set_active_signing_keys(count: u64) {
    gauge!("auth_active_signing_keys").set(count as f64);
}

/// Record a detected key store invariant violation
///
/// Metric: `auth_key_store_anomalies_total`
/// Labels: `kind`
///
/// ALERT: Any non-zero value should page.
pub fn record_key_store_anomaly(kind: &str) {
    counter!("auth_key_store_anomalies_total", "kind" => kind.to_string()).increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record JWKS request
///
/// Metric: `auth_jwks_requests_total`
/// Labels: `status`
pub fn record_jwks_request(status: &str) {
    counter!("auth_jwks_requests_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `auth_http_requests_total`, `auth_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
///
/// Captures framework-level rejections (415, 400, 404, 405) as well as
/// handler responses.
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("auth_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("auth_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Collapse the request path to a bounded label set.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/.well-known/jwks.json" => "/.well-known/jwks.json",
        "/api/auth/login" => "/api/auth/login",
        "/api/auth/introspection" => "/api/auth/introspection",
        _ => "/other",
    }
}
