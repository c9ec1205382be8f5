//! Builder patterns for test data construction
//!
//! Builds user claims and signs them with a stored signing key, so tests can
//! produce tokens the login endpoint never would (expired, wrong issuer,
//! future `iat`).

use crate::crypto_fixtures::{test_master_key, FixtureError};
use crate::test_ids::{
    TEST_CLIENT_URL_1, TEST_ISSUER, TEST_USER_ALICE, TEST_USER_EMAIL, TEST_USER_FIRST_NAME,
};
use auth_server::crypto::{self, EncryptedKey, UserClaims};
use auth_server::models::SigningKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use secrecy::SecretBox;
use uuid::Uuid;

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .expires_in(-60)
///     .sign_with(&key)?;
/// ```
pub struct TestTokenBuilder {
    claims: UserClaims,
}

impl TestTokenBuilder {
    /// Create a new token builder for the fixture user and Client1
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            claims: UserClaims {
                sub: TEST_USER_ALICE.to_string(),
                jti: Uuid::new_v4().to_string(),
                name: TEST_USER_FIRST_NAME.to_string(),
                email: TEST_USER_EMAIL.to_string(),
                nameid: TEST_USER_EMAIL.to_string(),
                role: vec!["User".to_string()],
                iss: TEST_ISSUER.to_string(),
                aud: TEST_CLIENT_URL_1.to_string(),
                iat: now.timestamp(),
                exp: (now + Duration::seconds(3600)).timestamp(),
            },
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.claims.sub = subject.to_string();
        self
    }

    /// Set the audience
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.claims.aud = audience.to_string();
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.claims.iss = issuer.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.claims.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set expiration to an absolute timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.claims.exp = timestamp;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.claims.iat = timestamp;
        self
    }

    /// Build the claims
    pub fn build(self) -> UserClaims {
        self.claims
    }

    /// Sign the claims with `key`, which must be wrapped under the test
    /// master key.
    pub fn sign_with(self, key: &SigningKey) -> Result<String, FixtureError> {
        let encrypted = EncryptedKey {
            encrypted_data: SecretBox::new(Box::new(key.private_key_encrypted.clone())),
            nonce: key.encryption_nonce.clone(),
            tag: key.encryption_tag.clone(),
        };
        let private_key = crypto::decrypt_private_key(&encrypted, &test_master_key())
            .map_err(|e| FixtureError::Crypto(e.to_string()))?;

        crypto::sign_jwt(&self.claims, &private_key, &key.key_id)
            .map_err(|e| FixtureError::Crypto(e.to_string()))
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the payload of a signed token, keeping header and signature.
///
/// The result is structurally valid but its signature no longer matches.
pub fn tamper_payload(token: &str, edit: impl FnOnce(&mut serde_json::Value)) -> String {
    let mut parts = token.splitn(3, '.');
    let header = parts.next().unwrap_or_default();
    let payload = parts.next().unwrap_or_default();
    let signature = parts.next().unwrap_or_default();

    let mut claims: serde_json::Value = URL_SAFE_NO_PAD
        .decode(payload)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_else(|| serde_json::json!({}));
    edit(&mut claims);

    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.{signature}")
}
