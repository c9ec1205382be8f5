use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for request-time and background operations.
///
/// Token validation failures are deliberately absent: they are an expected
/// outcome reported as `Introspection::Inactive`, not an error.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Store unreachable or a query failed. Retriable.
    #[error("Store unavailable: {0}")]
    Store(String),

    /// Issuance attempted while no signing key is active.
    #[error("No active signing key available")]
    NoActiveKey,

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::NoActiveKey | AuthError::Crypto(_) | AuthError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AuthError::Store(_))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            AuthError::Store(_) => (
                "SERVICE_UNAVAILABLE",
                "The service is temporarily unavailable. Please retry.".to_string(),
            ),
            AuthError::NoActiveKey => (
                "NO_ACTIVE_KEY",
                "No signing key is currently available".to_string(),
            ),
            AuthError::Crypto(_) => (
                "CRYPTO_ERROR",
                "An internal cryptographic error occurred".to_string(),
            ),
            AuthError::InvalidCredentials => {
                ("INVALID_CREDENTIALS", "Invalid credentials".to_string())
            }
            AuthError::InvalidRequest(reason) => ("INVALID_REQUEST", reason.clone()),
            AuthError::Internal => ("INTERNAL_ERROR", "An internal error occurred".to_string()),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
