//! Cryptographic fixtures for testing
//!
//! RSA generation is not seedable through the production API, so keys are
//! fresh per call. The master key and config are fixed.

use crate::test_ids::TEST_ISSUER;
use auth_server::config::Config;
use auth_server::models::SigningKey;
use auth_server::services::key_management_service;
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// bcrypt cost for fixture passwords; the minimum keeps tests fast
pub const TEST_BCRYPT_COST: u32 = 4;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Invalid test configuration: {0}")]
    Config(String),
}

/// Test master key for encryption/decryption tests
///
/// Returns a deterministic 32-byte master key for AES-256-GCM testing.
pub fn test_master_key() -> Vec<u8> {
    vec![
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d,
        0x1e, 0x1f,
    ]
}

/// Server configuration using the test master key and issuer.
pub fn test_config() -> Result<Config, FixtureError> {
    test_config_with(&[])
}

/// Test configuration with environment-style overrides applied.
///
/// # Example
/// ```rust,ignore
/// let config = test_config_with(&[("PUBLISH_RETIRED_KEYS", "false")])?;
/// ```
pub fn test_config_with(overrides: &[(&str, &str)]) -> Result<Config, FixtureError> {
    let mut vars = HashMap::from([
        (
            "DATABASE_URL".to_string(),
            "postgresql://unused".to_string(),
        ),
        (
            "AUTH_MASTER_KEY".to_string(),
            general_purpose::STANDARD.encode(test_master_key()),
        ),
        ("JWT_ISSUER".to_string(), TEST_ISSUER.to_string()),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
    ]);

    for (name, value) in overrides {
        vars.insert((*name).to_string(), (*value).to_string());
    }

    Config::from_vars(&vars).map_err(|e| FixtureError::Config(e.to_string()))
}

/// Generate an inactive signing key wrapped under the test master key.
///
/// The key is valid for one year from `created_at`.
pub fn test_signing_key(created_at: DateTime<Utc>) -> Result<SigningKey, FixtureError> {
    key_management_service::generate_key_record(
        2048,
        &test_master_key(),
        Duration::days(365),
        created_at,
    )
    .map_err(|e| FixtureError::Crypto(e.to_string()))
}
