//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for issued tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// JWT header structure
#[derive(Debug, Deserialize)]
struct JwtHeader {
    pub alg: String,
    pub typ: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// JWT claims structure
#[derive(Debug, Deserialize)]
struct JwtClaims {
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub role: Vec<String>,
}

fn decode_part<T: for<'de> Deserialize<'de>>(token: &str, index: usize, what: &str) -> T {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT has no {what} segment"));
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT {what}: {e:?}"));
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("Failed to parse JWT {what} JSON: {e:?}"))
}

/// Custom assertions for issued tokens
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_jwt()
///     .assert_signed_by(&key_id)
///     .assert_has_role("Admin");
/// ```
pub trait TokenAssertions {
    /// Assert that the token is an RS256 JWT with a `kid`
    fn assert_valid_jwt(&self) -> &Self;

    /// Assert that the token was signed by the specified key
    fn assert_signed_by(&self, key_id: &str) -> &Self;

    /// Assert that the token expires within the specified seconds
    fn assert_expires_in(&self, seconds: u64) -> &Self;

    /// Assert that the token is for the specified subject
    fn assert_for_subject(&self, subject: &str) -> &Self;

    /// Assert that the token's audience is the specified client URL
    fn assert_for_audience(&self, audience: &str) -> &Self;

    /// Assert that the token carries the specified role
    fn assert_has_role(&self, role: &str) -> &Self;
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        let parts: Vec<_> = self.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "JWT must have 3 parts (header.payload.signature), got {}",
            parts.len()
        );

        let header: JwtHeader = decode_part(self, 0, "header");
        assert_eq!(header.alg, "RS256", "Expected RS256 algorithm");
        assert_eq!(header.typ, "JWT", "Expected JWT type");
        assert!(header.kid.is_some(), "JWT header must carry a kid");

        let _: JwtClaims = decode_part(self, 1, "payload");

        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header: JwtHeader = decode_part(self, 0, "header");

        assert_eq!(
            header.kid.as_deref(),
            Some(key_id),
            "Expected key_id '{}', got {:?}",
            key_id,
            header.kid
        );

        self
    }

    fn assert_expires_in(&self, seconds: u64) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");

        let now = chrono::Utc::now().timestamp();
        let expires_in = claims.exp - now;

        // Allow 5-second tolerance for slow test runs
        assert!(
            (expires_in - seconds as i64).abs() <= 5,
            "Expected token to expire in {} seconds, but expires in {} seconds",
            seconds,
            expires_in
        );

        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");

        assert_eq!(
            claims.sub, subject,
            "Expected subject '{}', got '{}'",
            subject, claims.sub
        );

        self
    }

    fn assert_for_audience(&self, audience: &str) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");

        assert_eq!(
            claims.aud, audience,
            "Expected audience '{}', got '{}'",
            audience, claims.aud
        );

        self
    }

    fn assert_has_role(&self, role: &str) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");

        assert!(
            claims.role.iter().any(|r| r == role),
            "Token does not carry role '{}'. Roles: {:?}",
            role,
            claims.role
        );

        self
    }
}
