use base64::{engine::general_purpose, Engine as _};
use secrecy::SecretBox;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default key rotation check interval (7 days).
pub const DEFAULT_ROTATION_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Upper bound on the rotation check interval (1 year).
pub const MAX_ROTATION_INTERVAL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Default lead time before key expiry at which rotation fires (10 days).
pub const DEFAULT_ROTATION_LEAD_TIME_SECONDS: i64 = 10 * 24 * 60 * 60;

/// Default validity period of a freshly generated signing key.
pub const DEFAULT_KEY_VALIDITY_DAYS: i64 = 365;

/// Default RSA modulus size.
pub const DEFAULT_KEY_SIZE_BITS: usize = 2048;

/// Accepted RSA modulus sizes. RS256 verifiers reject anything under 2048.
pub const ALLOWED_KEY_SIZES: [usize; 3] = [2048, 3072, 4096];

/// Default access token lifetime (1 hour).
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;

/// Upper bound on token lifetime (30 days).
pub const MAX_TOKEN_LIFETIME_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Upper bound on signing key validity (10 years).
pub const MAX_KEY_VALIDITY_DAYS: i64 = 10 * 365;

/// Upper bound on rotation lead time; never longer than the longest key validity.
pub const MAX_ROTATION_LEAD_TIME_SECONDS: i64 = MAX_KEY_VALIDITY_DAYS * 24 * 60 * 60;

#[derive(Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// AES-256-GCM key wrapping signing key private material at rest.
    pub master_key: SecretBox<Vec<u8>>,
    /// Value of the `iss` claim on issued tokens, enforced on introspection.
    pub issuer: String,
    pub rotation_interval_seconds: u64,
    pub rotation_lead_time_seconds: i64,
    pub key_validity_days: i64,
    pub key_size_bits: usize,
    pub token_lifetime_seconds: i64,
    /// Keep retired-but-unexpired keys in JWKS and accept their tokens.
    pub publish_retired_keys: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid master key format: {0}")]
    InvalidMasterKey(String),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let master_key_base64 = vars
            .get("AUTH_MASTER_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_MASTER_KEY".to_string()))?;

        let master_key = general_purpose::STANDARD
            .decode(master_key_base64)
            .map_err(ConfigError::Base64Error)?;

        if master_key.len() != 32 {
            return Err(ConfigError::InvalidMasterKey(format!(
                "Expected 32 bytes, got {}",
                master_key.len()
            )));
        }

        let issuer = vars
            .get("JWT_ISSUER")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("JWT_ISSUER".to_string()))?
            .clone();

        let rotation_interval_seconds: u64 = parse_or_default(
            vars,
            "KEY_ROTATION_INTERVAL_SECONDS",
            DEFAULT_ROTATION_INTERVAL_SECONDS,
        )?;
        if rotation_interval_seconds == 0 {
            return Err(invalid("KEY_ROTATION_INTERVAL_SECONDS", "must be positive"));
        }
        if rotation_interval_seconds > MAX_ROTATION_INTERVAL_SECONDS {
            return Err(invalid(
                "KEY_ROTATION_INTERVAL_SECONDS",
                &format!("must not exceed {}", MAX_ROTATION_INTERVAL_SECONDS),
            ));
        }

        let rotation_lead_time_seconds: i64 = parse_or_default(
            vars,
            "KEY_ROTATION_LEAD_TIME_SECONDS",
            DEFAULT_ROTATION_LEAD_TIME_SECONDS,
        )?;
        if rotation_lead_time_seconds < 0 {
            return Err(invalid("KEY_ROTATION_LEAD_TIME_SECONDS", "must not be negative"));
        }
        if rotation_lead_time_seconds > MAX_ROTATION_LEAD_TIME_SECONDS {
            return Err(invalid(
                "KEY_ROTATION_LEAD_TIME_SECONDS",
                &format!("must not exceed {}", MAX_ROTATION_LEAD_TIME_SECONDS),
            ));
        }

        let key_validity_days: i64 =
            parse_or_default(vars, "KEY_VALIDITY_DAYS", DEFAULT_KEY_VALIDITY_DAYS)?;
        if key_validity_days <= 0 {
            return Err(invalid("KEY_VALIDITY_DAYS", "must be positive"));
        }
        if key_validity_days > MAX_KEY_VALIDITY_DAYS {
            return Err(invalid(
                "KEY_VALIDITY_DAYS",
                &format!("must not exceed {}", MAX_KEY_VALIDITY_DAYS),
            ));
        }

        // A key that is already inside the lead window when created would be
        // rotated on every tick.
        let key_validity_seconds = key_validity_days
            .checked_mul(24 * 60 * 60)
            .ok_or_else(|| invalid("KEY_VALIDITY_DAYS", "out of range"))?;
        if key_validity_seconds <= rotation_lead_time_seconds {
            return Err(invalid(
                "KEY_VALIDITY_DAYS",
                "must exceed KEY_ROTATION_LEAD_TIME_SECONDS",
            ));
        }

        let key_size_bits: usize = parse_or_default(vars, "KEY_SIZE_BITS", DEFAULT_KEY_SIZE_BITS)?;
        if !ALLOWED_KEY_SIZES.contains(&key_size_bits) {
            return Err(invalid(
                "KEY_SIZE_BITS",
                &format!("must be one of {:?}, got {}", ALLOWED_KEY_SIZES, key_size_bits),
            ));
        }

        let token_lifetime_seconds: i64 = parse_or_default(
            vars,
            "TOKEN_LIFETIME_SECONDS",
            DEFAULT_TOKEN_LIFETIME_SECONDS,
        )?;
        if token_lifetime_seconds <= 0 {
            return Err(invalid("TOKEN_LIFETIME_SECONDS", "must be positive"));
        }
        if token_lifetime_seconds > MAX_TOKEN_LIFETIME_SECONDS {
            return Err(invalid(
                "TOKEN_LIFETIME_SECONDS",
                &format!("must not exceed {}", MAX_TOKEN_LIFETIME_SECONDS),
            ));
        }

        let publish_retired_keys: bool = parse_or_default(vars, "PUBLISH_RETIRED_KEYS", true)?;

        Ok(Config {
            database_url,
            bind_address,
            master_key: SecretBox::new(Box::new(master_key)),
            issuer,
            rotation_interval_seconds,
            rotation_lead_time_seconds,
            key_validity_days,
            key_size_bits,
            token_lifetime_seconds,
            publish_retired_keys,
        })
    }
}

fn parse_or_default<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
