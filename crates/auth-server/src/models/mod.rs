use crate::errors::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Signing key model (maps to signing_keys table)
///
/// Private material is stored wrapped under the master key; only
/// `crypto::decrypt_private_key` can recover it.
#[derive(Clone, FromRow)]
pub struct SigningKey {
    pub key_id: String,
    /// RSA public key, PKCS#1 DER.
    pub public_key: Vec<u8>,
    /// RSA private key (PKCS#1 DER) encrypted with AES-256-GCM.
    pub private_key_encrypted: Vec<u8>,
    pub encryption_nonce: Vec<u8>,
    pub encryption_tag: Vec<u8>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SigningKey {
    /// Whether the key may still verify signatures at `now`.
    pub fn is_unexpired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("private_key_encrypted", &"[REDACTED]")
            .field("encryption_nonce", &"[REDACTED]")
            .field("encryption_tag", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Issued-token ledger entry (maps to user_sessions table)
#[derive(Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: String,
    /// Key that signed `token`.
    pub key_id: String,
    pub token: String,
    /// Advisory; the token's own `exp` is authoritative.
    pub expires: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .field("token", &"[REDACTED]")
            .field("expires", &self.expires)
            .finish()
    }
}

/// Registered relying party (maps to clients table)
#[derive(Debug, Clone, FromRow)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    /// Used as the `aud` claim of tokens issued for this client.
    pub client_url: String,
}

/// An already-authenticated identity that tokens are issued for.
#[derive(Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub roles: Vec<String>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("email", &"[REDACTED]")
            .field("first_name", &"[REDACTED]")
            .field("roles", &self.roles)
            .finish()
    }
}

/// User row as read from the identity store, including its password hash.
#[derive(Clone, FromRow)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub password_hash: String,
}

/// Principal plus the bcrypt hash used to authenticate it.
#[derive(Clone)]
pub struct PrincipalCredentials {
    pub principal: Principal,
    pub password_hash: String,
}

impl fmt::Debug for PrincipalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalCredentials")
            .field("principal", &self.principal)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// Shortest accepted password.
pub const MIN_PASSWORD_LENGTH: usize = 6;
/// Longest accepted password. Also bounds bcrypt work per request.
pub const MAX_PASSWORD_LENGTH: usize = 100;
pub const MAX_EMAIL_LENGTH: usize = 100;

/// Login request body (`POST /api/auth/login`)
///
/// Missing fields deserialize as empty and are rejected by `validate`, so a
/// partial body gets the same 400 as a blank one.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
}

impl LoginRequest {
    /// Shape checks only; says nothing about whether the credentials exist.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty()
            || self.password.is_empty()
            || self.client_id.trim().is_empty()
        {
            return Err(AuthError::InvalidRequest(
                "email, password and clientId are required".to_string(),
            ));
        }

        if self.email.chars().count() > MAX_EMAIL_LENGTH {
            return Err(AuthError::InvalidRequest(format!(
                "email must be at most {} characters",
                MAX_EMAIL_LENGTH
            )));
        }

        let password_len = self.password.chars().count();
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password_len) {
            return Err(AuthError::InvalidRequest(format!(
                "password must be between {} and {} characters",
                MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Introspection request body (`POST /api/auth/introspection`, form-encoded)
#[derive(Clone, Deserialize)]
pub struct IntrospectionRequest {
    #[serde(default)]
    pub token: String,
}

impl fmt::Debug for IntrospectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionRequest")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// JWKS response (RFC 7517)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<JsonWebKey>,
}

/// RSA JSON Web Key (RFC 7517 / RFC 7518 §6.3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String, // Key Type ("RSA")
    #[serde(rename = "use")]
    pub use_: String, // Public key use ("sig")
    pub kid: String, // Key ID
    pub alg: String, // Algorithm ("RS256")
    pub n: String,   // Modulus (base64url, no padding)
    pub e: String,   // Exponent (base64url, no padding)
}

/// Introspection response (RFC 7662 subset)
///
/// Inactive tokens serialize as `{"active": false}` with nothing else.
#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(flatten)]
    pub details: Option<IntrospectionDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionDetails {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub kid: String,
}

/// Key rotation event type (for audit logging)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventType {
    KeyGenerated,
    KeyRotated,
    RotationSuperseded,
    RotationFailed,
}

impl KeyEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEventType::KeyGenerated => "key_generated",
            KeyEventType::KeyRotated => "key_rotated",
            KeyEventType::RotationSuperseded => "rotation_superseded",
            KeyEventType::RotationFailed => "rotation_failed",
        }
    }
}
