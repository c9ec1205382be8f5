use crate::errors::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM},
    rand::{SecureRandom, SystemRandom},
};
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Maximum allowed JWT size in bytes (4KB).
///
/// Checked before any base64 decoding or signature work so oversized
/// tokens are rejected with minimal resource usage.
pub const MAX_JWT_SIZE_BYTES: usize = 4096;

/// Tolerance for `iat` values ahead of the verifier's clock.
pub const IAT_CLOCK_SKEW_SECONDS: i64 = 300;

/// bcrypt hash of a random value, verified against when the user does not
/// exist so unknown-user and wrong-password failures cost the same.
pub const DUMMY_PASSWORD_HASH: &str =
    "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

/// Freshly generated RSA key pair, both halves PKCS#1 DER.
pub struct GeneratedKeyPair {
    pub public_key_der: Vec<u8>,
    pub private_key_der: SecretBox<Vec<u8>>,
}

impl fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("public_key_der_len", &self.public_key_der.len())
            .field("private_key_der", &"[REDACTED]")
            .finish()
    }
}

/// Encrypted key structure (AES-256-GCM)
///
/// Debug is manually implemented to redact all cryptographic material.
/// Clone is manually implemented because SecretBox requires explicit cloning.
pub struct EncryptedKey {
    /// Encrypted key material (AES-256-GCM ciphertext).
    pub encrypted_data: SecretBox<Vec<u8>>,
    pub nonce: Vec<u8>, // 96-bit (12 bytes)
    pub tag: Vec<u8>,   // 128-bit (16 bytes)
}

impl Clone for EncryptedKey {
    fn clone(&self) -> Self {
        Self {
            encrypted_data: SecretBox::new(Box::new(self.encrypted_data.expose_secret().clone())),
            nonce: self.nonce.clone(),
            tag: self.tag.clone(),
        }
    }
}

impl fmt::Debug for EncryptedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedKey")
            .field("encrypted_data", &"[REDACTED]")
            .field("nonce", &"[REDACTED]")
            .field("tag", &"[REDACTED]")
            .finish()
    }
}

/// Public RSA parameters as published in a JWK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaComponents {
    /// Modulus, base64url without padding.
    pub n: String,
    /// Public exponent, base64url without padding.
    pub e: String,
}

/// Access token claims.
///
/// `sub`, `name`, `email` and `nameid` identify a person and are redacted
/// from Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Unique token identifier
    pub jti: String,
    /// User's first name
    pub name: String,
    pub email: String,
    /// Name identifier (the user's email)
    pub nameid: String,
    /// One entry per assigned role
    #[serde(default)]
    pub role: Vec<String>,
    pub iss: String,
    /// Audience: the client's URL
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("sub", &"[REDACTED]")
            .field("jti", &self.jti)
            .field("name", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("nameid", &"[REDACTED]")
            .field("role", &self.role)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

/// Why a presented token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Oversized,
    Malformed,
    UnknownKey,
    BadSignature,
    WrongIssuer,
    Expired,
    IssuedInFuture,
}

impl TokenRejection {
    /// Bounded label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::Oversized => "oversized",
            TokenRejection::Malformed => "malformed",
            TokenRejection::UnknownKey => "unknown_key",
            TokenRejection::BadSignature => "bad_signature",
            TokenRejection::WrongIssuer => "wrong_issuer",
            TokenRejection::Expired => "expired",
            TokenRejection::IssuedInFuture => "issued_in_future",
        }
    }
}

/// Generate an RSA keypair of `bits` modulus size using the OS CSPRNG.
#[instrument(skip_all, fields(bits = bits))]
pub fn generate_signing_key(bits: usize) -> Result<GeneratedKeyPair, AuthError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| AuthError::Crypto(format!("Keypair generation failed: {}", e)))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_der = private_key
        .to_pkcs1_der()
        .map_err(|e| AuthError::Crypto(format!("Private key encoding failed: {}", e)))?;
    let public_der = public_key
        .to_pkcs1_der()
        .map_err(|e| AuthError::Crypto(format!("Public key encoding failed: {}", e)))?;

    Ok(GeneratedKeyPair {
        public_key_der: public_der.as_bytes().to_vec(),
        private_key_der: SecretBox::new(Box::new(private_der.as_bytes().to_vec())),
    })
}

/// Extract the base64url modulus and exponent from a PKCS#1 DER public key.
pub fn public_key_components(public_key_der: &[u8]) -> Result<RsaComponents, AuthError> {
    let public_key = RsaPublicKey::from_pkcs1_der(public_key_der)
        .map_err(|e| AuthError::Crypto(format!("Invalid public key encoding: {}", e)))?;

    Ok(RsaComponents {
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

/// Encrypt private key with AES-256-GCM
///
/// Uses a 96-bit random nonce and produces a 128-bit authentication tag
#[instrument(skip_all)]
pub fn encrypt_private_key(private_key: &[u8], master_key: &[u8]) -> Result<EncryptedKey, AuthError> {
    if master_key.len() != 32 {
        return Err(AuthError::Crypto(format!(
            "Invalid master key length: {} (expected 32)",
            master_key.len()
        )));
    }

    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes)
        .map_err(|e| AuthError::Crypto(format!("Nonce generation failed: {}", e)))?;

    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| AuthError::Crypto(format!("Cipher key creation failed: {}", e)))?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let mut in_out = private_key.to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| AuthError::Crypto(format!("Encryption operation failed: {}", e)))?;

    // Buffer now holds ciphertext followed by the 16-byte tag
    let tag_start = in_out
        .len()
        .checked_sub(16)
        .ok_or_else(|| AuthError::Crypto("Encryption produced invalid output".to_string()))?;
    let tag = in_out.split_off(tag_start);

    Ok(EncryptedKey {
        encrypted_data: SecretBox::new(Box::new(in_out)),
        nonce: nonce_bytes.to_vec(),
        tag,
    })
}

/// Decrypt private key with AES-256-GCM
#[instrument(skip_all)]
pub fn decrypt_private_key(
    encrypted: &EncryptedKey,
    master_key: &[u8],
) -> Result<SecretBox<Vec<u8>>, AuthError> {
    if master_key.len() != 32 {
        return Err(AuthError::Crypto(format!(
            "Invalid master key length: {} (expected 32)",
            master_key.len()
        )));
    }

    if encrypted.tag.len() != 16 {
        return Err(AuthError::Crypto(format!(
            "Invalid tag length: {} (expected 16)",
            encrypted.tag.len()
        )));
    }

    let nonce_bytes: [u8; 12] = encrypted.nonce.as_slice().try_into().map_err(|_| {
        AuthError::Crypto(format!(
            "Invalid nonce length: {} (expected 12)",
            encrypted.nonce.len()
        ))
    })?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = encrypted.encrypted_data.expose_secret().clone();
    in_out.extend_from_slice(&encrypted.tag);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| AuthError::Crypto(format!("Cipher key creation failed: {}", e)))?;
    let opening_key = LessSafeKey::new(unbound_key);

    let decrypted = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| AuthError::Crypto(format!("Decryption operation failed: {}", e)))?;

    Ok(SecretBox::new(Box::new(decrypted.to_vec())))
}

/// Sign claims as an RS256 JWT whose header `kid` names the signing key.
#[instrument(skip_all)]
pub fn sign_jwt(
    claims: &UserClaims,
    private_key_der: &SecretBox<Vec<u8>>,
    key_id: &str,
) -> Result<String, AuthError> {
    let encoding_key = EncodingKey::from_rsa_der(private_key_der.expose_secret());

    let mut header = Header::new(Algorithm::RS256);
    header.typ = Some("JWT".to_string());
    header.kid = Some(key_id.to_string());

    encode(&header, claims, &encoding_key)
        .map_err(|e| AuthError::Crypto(format!("JWT signing operation failed: {}", e)))
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// SECURITY NOTE: This function does NOT validate the token. It only
/// selects which key to verify against.
#[instrument(skip_all)]
pub fn extract_jwt_kid(token: &str) -> Result<String, TokenRejection> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        return Err(TokenRejection::Oversized);
    }

    let header = jsonwebtoken::decode_header(token).map_err(|_| TokenRejection::Malformed)?;
    header.kid.ok_or(TokenRejection::Malformed)
}

/// Verify an RS256 JWT against published RSA components.
///
/// Validates:
/// - Token size (must be <= MAX_JWT_SIZE_BYTES)
/// - Signature (RS256 only; other algorithms are rejected)
/// - Issuer (`iss` must equal `issuer`)
/// - Expiration: a token is expired once `now >= exp`
/// - Issued-at not more than `IAT_CLOCK_SKEW_SECONDS` ahead of `now`
#[instrument(skip_all)]
pub fn verify_jwt(
    token: &str,
    components: &RsaComponents,
    issuer: &str,
    now: i64,
) -> Result<UserClaims, TokenRejection> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "crypto",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(TokenRejection::Oversized);
    }

    let decoding_key = DecodingKey::from_rsa_components(&components.n, &components.e)
        .map_err(|e| {
            tracing::warn!(target: "crypto", error = %e, "Stored public key is unusable");
            TokenRejection::UnknownKey
        })?;

    // Expiry is checked below against the caller's clock with no leeway.
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.set_issuer(&[issuer]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    let token_data = decode::<UserClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "crypto", error = %e, "Token verification failed");
        match e.kind() {
            ErrorKind::InvalidSignature => TokenRejection::BadSignature,
            ErrorKind::InvalidIssuer => TokenRejection::WrongIssuer,
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            _ => TokenRejection::Malformed,
        }
    })?;

    let claims = token_data.claims;

    if now >= claims.exp {
        tracing::debug!(target: "crypto", exp = claims.exp, now = now, "Token rejected: expired");
        return Err(TokenRejection::Expired);
    }

    if claims.iat > now + IAT_CLOCK_SKEW_SECONDS {
        tracing::debug!(
            target: "crypto",
            iat = claims.iat,
            now = now,
            "Token rejected: iat too far in the future"
        );
        return Err(TokenRejection::IssuedInFuture);
    }

    Ok(claims)
}

/// Verify a password against its bcrypt hash
#[instrument(skip_all)]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash)
        .map_err(|e| AuthError::Crypto(format!("Password verification failed: {}", e)))
}
