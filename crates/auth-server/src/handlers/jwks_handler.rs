use crate::errors::AuthError;
use crate::models::Jwks;
use crate::observability::metrics::record_jwks_request;
use crate::services::key_management_service;
use axum::{
    extract::State,
    http::header::{HeaderMap, HeaderValue, CACHE_CONTROL},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use super::auth_handler::AppState;

/// Handle JWKS request
///
/// GET /.well-known/jwks.json
///
/// Returns every published RSA public key (RFC 7517). Clients may cache for
/// five minutes; a rotated key becomes visible to them within that window.
#[instrument(name = "auth.jwks.get", skip_all, fields(status))]
pub async fn handle_get_jwks(
    State(state): State<Arc<AppState>>,
) -> Result<(HeaderMap, Json<Jwks>), AuthError> {
    let result =
        key_management_service::get_jwks(state.store.as_ref(), &state.config, Utc::now()).await;

    let status = if result.is_ok() { "success" } else { "error" };
    tracing::Span::current().record("status", status);
    record_jwks_request(status);

    let jwks = result?;

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=300"));

    Ok((headers, Json(jwks)))
}
