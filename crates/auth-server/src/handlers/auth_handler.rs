use crate::config::Config;
use crate::errors::AuthError;
use crate::models::{IntrospectionRequest, IntrospectionResponse, LoginRequest, TokenResponse};
use crate::observability::metrics::record_token_issuance;
use crate::repositories::Store;
use crate::services::{introspection_service, token_service};
use axum::{
    extract::{rejection::FormRejection, rejection::JsonRejection, State},
    Form, Json,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
}

/// Handle login
///
/// POST /api/auth/login
///
/// Body: `{"email", "password", "clientId"}`. Every credential failure is a
/// 401 with the same body.
#[instrument(name = "auth.login", skip_all, fields(status))]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let start = Instant::now();

    let result = match payload {
        Ok(Json(request)) => {
            token_service::login(state.store.as_ref(), &state.config, &request, Utc::now()).await
        }
        Err(rejection) => {
            tracing::debug!(target: "auth.login", error = %rejection, "Malformed login body");
            Err(AuthError::InvalidRequest(
                "Request body must be JSON with email, password and clientId".to_string(),
            ))
        }
    };

    let status = if result.is_ok() { "success" } else { "error" };
    tracing::Span::current().record("status", status);
    record_token_issuance(status, start.elapsed());

    let issued = result?;

    Ok(Json(TokenResponse {
        token: issued.token,
    }))
}

/// Handle token introspection
///
/// POST /api/auth/introspection
///
/// Form body `token=<JWT>`. Any validation failure, including a missing or
/// unparseable body, answers `{"active": false}`. Only store failures are
/// errors (503).
#[instrument(name = "auth.introspection", skip_all, fields(active))]
pub async fn handle_introspection(
    State(state): State<Arc<AppState>>,
    payload: Result<Form<IntrospectionRequest>, FormRejection>,
) -> Result<Json<IntrospectionResponse>, AuthError> {
    let token = match payload {
        Ok(Form(request)) => request.token,
        Err(rejection) => {
            tracing::debug!(
                target: "auth.introspection",
                error = %rejection,
                "Malformed introspection body"
            );
            String::new()
        }
    };

    let verdict =
        introspection_service::introspect(state.store.as_ref(), &state.config, &token, Utc::now())
            .await?;

    tracing::Span::current().record("active", verdict.is_active());

    Ok(Json(verdict.into_response()))
}
