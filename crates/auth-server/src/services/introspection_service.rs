use crate::config::Config;
use crate::crypto::{self, TokenRejection, UserClaims};
use crate::errors::AuthError;
use crate::models::{IntrospectionDetails, IntrospectionResponse};
use crate::observability::metrics;
use crate::repositories::KeyStore;
use chrono::{DateTime, Utc};
use tracing::instrument;

/// Verdict on a presented token.
///
/// Validation failures are a normal outcome, not an error. Only store
/// failures surface as `Err` from `introspect`.
#[derive(Debug, Clone)]
pub enum Introspection {
    Active { claims: UserClaims, key_id: String },
    Inactive(TokenRejection),
}

impl Introspection {
    pub fn is_active(&self) -> bool {
        matches!(self, Introspection::Active { .. })
    }

    pub fn into_response(self) -> IntrospectionResponse {
        match self {
            Introspection::Active { claims, key_id } => IntrospectionResponse {
                active: true,
                details: Some(IntrospectionDetails {
                    sub: claims.sub,
                    aud: claims.aud,
                    iss: claims.iss,
                    exp: claims.exp,
                    iat: claims.iat,
                    jti: claims.jti,
                    kid: key_id,
                }),
            },
            Introspection::Inactive(_) => IntrospectionResponse {
                active: false,
                details: None,
            },
        }
    }
}

/// Validate a bearer token against the key named in its header.
///
/// The key need not be the active one: any retained, unexpired key that is
/// currently published verifies its own tokens.
#[instrument(skip_all)]
pub async fn introspect<S: KeyStore + ?Sized>(
    store: &S,
    config: &Config,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Introspection, AuthError> {
    let verdict = match verify(store, config, token, now).await {
        Ok(verdict) => verdict,
        Err(e) => {
            metrics::record_token_introspection("error", Some("store"));
            return Err(e);
        }
    };

    match &verdict {
        Introspection::Active { key_id, .. } => {
            tracing::debug!(target: "auth.introspection", key_id = %key_id, "Token active");
            metrics::record_token_introspection("active", None);
        }
        Introspection::Inactive(reason) => {
            tracing::debug!(
                target: "auth.introspection",
                reason = reason.as_str(),
                "Token inactive"
            );
            metrics::record_token_introspection("inactive", Some(reason.as_str()));
        }
    }

    Ok(verdict)
}

async fn verify<S: KeyStore + ?Sized>(
    store: &S,
    config: &Config,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Introspection, AuthError> {
    if token.is_empty() {
        return Ok(Introspection::Inactive(TokenRejection::Malformed));
    }

    let key_id = match crypto::extract_jwt_kid(token) {
        Ok(kid) => kid,
        Err(reason) => return Ok(Introspection::Inactive(reason)),
    };

    let Some(key) = store.get_by_key_id(&key_id).await? else {
        return Ok(Introspection::Inactive(TokenRejection::UnknownKey));
    };

    let published = key.is_active || config.publish_retired_keys;
    if !published || !key.is_unexpired_at(now) {
        return Ok(Introspection::Inactive(TokenRejection::UnknownKey));
    }

    let components = match crypto::public_key_components(&key.public_key) {
        Ok(components) => components,
        Err(e) => {
            tracing::error!(
                target: "auth.introspection",
                key_id = %key.key_id,
                error = %e,
                "Stored public key is unreadable"
            );
            metrics::record_key_store_anomaly("unreadable_public_key");
            return Ok(Introspection::Inactive(TokenRejection::UnknownKey));
        }
    };

    match crypto::verify_jwt(token, &components, &config.issuer, now.timestamp()) {
        Ok(claims) => Ok(Introspection::Active { claims, key_id }),
        Err(reason) => Ok(Introspection::Inactive(reason)),
    }
}
