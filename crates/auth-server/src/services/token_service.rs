use crate::config::Config;
use crate::crypto::{self, EncryptedKey, UserClaims};
use crate::errors::AuthError;
use crate::models::{Client, LoginRequest, Principal, Session};
use crate::observability::hash_for_correlation;
use crate::repositories::{KeyStore, SessionLedger, Store};
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use tracing::instrument;
use uuid::Uuid;

/// A freshly signed token and the facts recorded about it.
pub struct IssuedToken {
    pub token: String,
    pub key_id: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("key_id", &self.key_id)
            .field("session_id", &self.session_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Authenticate email/password for a client and issue a token.
///
/// Unknown client, unknown user and wrong password all return
/// `InvalidCredentials`, and all pay for one bcrypt verification.
#[instrument(skip_all, fields(client = %hash_for_correlation(&request.client_id)))]
pub async fn login<S: Store + ?Sized>(
    store: &S,
    config: &Config,
    request: &LoginRequest,
    now: DateTime<Utc>,
) -> Result<IssuedToken, AuthError> {
    request.validate()?;

    let client = store.get_by_client_id(&request.client_id).await?;
    let credentials = match client {
        Some(_) => store.get_principal_by_email(&request.email).await?,
        None => None,
    };

    // Always run bcrypt to prevent timing attacks
    let hash_to_verify = credentials
        .as_ref()
        .map(|c| c.password_hash.as_str())
        .unwrap_or(crypto::DUMMY_PASSWORD_HASH);

    let is_valid = crypto::verify_password(&request.password, hash_to_verify)?;

    let (Some(client), Some(credentials)) = (client, credentials) else {
        tracing::debug!(target: "auth.login", "Login rejected: unknown client or user");
        return Err(AuthError::InvalidCredentials);
    };

    if !is_valid {
        tracing::debug!(target: "auth.login", "Login rejected: password mismatch");
        return Err(AuthError::InvalidCredentials);
    }

    issue_user_token(store, config, &credentials.principal, &client, now).await
}

/// Sign a token for an authenticated principal and record the session.
///
/// Fails with `NoActiveKey` when nothing is active; never falls back to a
/// retired key.
#[instrument(skip_all, fields(client = %hash_for_correlation(&client.client_id)))]
pub async fn issue_user_token<S: KeyStore + SessionLedger + ?Sized>(
    store: &S,
    config: &Config,
    principal: &Principal,
    client: &Client,
    now: DateTime<Utc>,
) -> Result<IssuedToken, AuthError> {
    let signing_key = store.get_active_key().await?.ok_or_else(|| {
        tracing::error!(target: "auth.token", "Token issuance attempted with no active signing key");
        AuthError::NoActiveKey
    })?;

    let encrypted = EncryptedKey {
        encrypted_data: SecretBox::new(Box::new(signing_key.private_key_encrypted.clone())),
        nonce: signing_key.encryption_nonce.clone(),
        tag: signing_key.encryption_tag.clone(),
    };
    let private_key = crypto::decrypt_private_key(&encrypted, config.master_key.expose_secret())?;

    let iat = now.timestamp();
    let exp = iat.checked_add(config.token_lifetime_seconds).ok_or_else(|| {
        tracing::error!(target: "auth.token", "Token lifetime overflows the expiry timestamp");
        AuthError::Internal
    })?;
    let expires_at = Utc.timestamp_opt(exp, 0).single().ok_or_else(|| {
        tracing::error!(target: "auth.token", "Token expiry is out of range");
        AuthError::Internal
    })?;

    let claims = UserClaims {
        sub: principal.user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        name: principal.first_name.clone(),
        email: principal.email.clone(),
        nameid: principal.email.clone(),
        role: principal.roles.clone(),
        iss: config.issuer.clone(),
        aud: client.client_url.clone(),
        iat,
        exp,
    };

    let token = crypto::sign_jwt(&claims, &private_key, &signing_key.key_id)?;

    let session = Session {
        id: Uuid::new_v4(),
        user_id: principal.user_id,
        client_id: client.client_id.clone(),
        key_id: signing_key.key_id.clone(),
        token: token.clone(),
        expires: expires_at,
    };
    store.record_session(&session).await?;

    tracing::info!(
        target: "auth.token",
        key_id = %signing_key.key_id,
        session_id = %session.id,
        "Issued user token"
    );

    Ok(IssuedToken {
        token,
        key_id: signing_key.key_id,
        session_id: session.id,
        expires_at,
    })
}
