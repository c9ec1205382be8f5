use crate::config::Config;
use crate::crypto;
use crate::errors::AuthError;
use crate::models::{JsonWebKey, Jwks, KeyEventType, SigningKey};
use crate::observability::metrics;
use crate::repositories::{KeyStore, RotationOutcome};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretBox};
use tracing::instrument;
use uuid::Uuid;

/// Result of one scheduler check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationCheck {
    /// The active key is outside the lead window.
    NotDue { active_key_id: String },
    Rotated {
        new_key_id: String,
        retired_key_id: Option<String>,
    },
    /// Another writer rotated first; this attempt wrote nothing.
    Superseded { current_key_id: Option<String> },
}

/// Generate a key pair and wrap its private half for storage.
///
/// The returned record is inactive; only `KeyStore::rotate` activates keys.
pub fn generate_key_record(
    key_size_bits: usize,
    master_key: &[u8],
    validity: Duration,
    now: DateTime<Utc>,
) -> Result<SigningKey, AuthError> {
    let pair = crypto::generate_signing_key(key_size_bits)?;
    let encrypted = crypto::encrypt_private_key(pair.private_key_der.expose_secret(), master_key)?;
    let expires_at = now.checked_add_signed(validity).ok_or_else(|| {
        tracing::error!(target: "auth.key_management", "Key validity overflows the expiry timestamp");
        AuthError::Internal
    })?;

    Ok(SigningKey {
        key_id: Uuid::new_v4().to_string(),
        public_key: pair.public_key_der,
        private_key_encrypted: encrypted.encrypted_data.expose_secret().clone(),
        encryption_nonce: encrypted.nonce,
        encryption_tag: encrypted.tag,
        is_active: false,
        created_at: now,
        expires_at,
    })
}

/// Run `generate_key_record` off the async workers; RSA generation takes
/// tens to hundreds of milliseconds.
async fn generate_key_record_blocking(
    config: &Config,
    now: DateTime<Utc>,
) -> Result<SigningKey, AuthError> {
    let key_size_bits = config.key_size_bits;
    let validity = Duration::try_days(config.key_validity_days).ok_or_else(|| {
        tracing::error!(target: "auth.key_management", "Key validity out of range");
        AuthError::Internal
    })?;
    let master_key = SecretBox::new(Box::new(config.master_key.expose_secret().clone()));

    tokio::task::spawn_blocking(move || {
        generate_key_record(key_size_bits, master_key.expose_secret(), validity, now)
    })
    .await
    .map_err(|e| {
        tracing::error!(target: "auth.key_management", error = %e, "Key generation task failed");
        AuthError::Internal
    })?
}

/// Whether the scheduler must rotate given the current active key.
///
/// Due when there is no active key or it expires within `lead_time`.
pub fn rotation_due(active: Option<&SigningKey>, now: DateTime<Utc>, lead_time: Duration) -> bool {
    match active {
        None => true,
        Some(key) => match now.checked_add_signed(lead_time) {
            Some(window_end) => key.expires_at <= window_end,
            // Window runs past the last representable instant
            None => true,
        },
    }
}

/// Check the active key and rotate it when due.
///
/// Safe to run concurrently from several processes: the store's
/// compare-and-swap lets exactly one of them install a new key.
#[instrument(skip_all)]
pub async fn rotate_if_due<S: KeyStore + ?Sized>(
    store: &S,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<RotationCheck, AuthError> {
    let active = store.get_active_key().await?;
    let lead_time = Duration::try_seconds(config.rotation_lead_time_seconds).ok_or_else(|| {
        tracing::error!(target: "auth.key_management", "Rotation lead time out of range");
        AuthError::Internal
    })?;

    if let Some(key) = active.as_ref() {
        metrics::set_signing_key_age_days((now - key.created_at).num_seconds() as f64 / 86_400.0);
    }

    if !rotation_due(active.as_ref(), now, lead_time) {
        let active_key_id = active.map(|k| k.key_id).unwrap_or_default();
        tracing::debug!(
            target: "auth.key_management",
            key_id = %active_key_id,
            "Active signing key outside rotation window"
        );
        return Ok(RotationCheck::NotDue { active_key_id });
    }

    let expected_active = active.as_ref().map(|k| k.key_id.clone());
    let new_key = generate_key_record_blocking(config, now).await?;

    let outcome = store.rotate(expected_active.as_deref(), &new_key).await?;

    let check = match outcome {
        RotationOutcome::Rotated {
            new_key_id,
            retired_key_id,
        } => {
            let event = if retired_key_id.is_some() {
                KeyEventType::KeyRotated
            } else {
                KeyEventType::KeyGenerated
            };
            tracing::info!(
                target: "auth.key_management",
                event = event.as_str(),
                new_key_id = %new_key_id,
                retired_key_id = ?retired_key_id,
                expires_at = %new_key.expires_at,
                "Signing key rotated"
            );
            metrics::record_key_rotation("success");
            metrics::set_signing_key_age_days(0.0);
            RotationCheck::Rotated {
                new_key_id,
                retired_key_id,
            }
        }
        RotationOutcome::Superseded { current_key_id } => {
            tracing::info!(
                target: "auth.key_management",
                event = KeyEventType::RotationSuperseded.as_str(),
                current_key_id = ?current_key_id,
                "Rotation superseded by a concurrent writer"
            );
            metrics::record_key_rotation("superseded");
            RotationCheck::Superseded { current_key_id }
        }
    };

    let active_count = store.list_active_keys().await?.len();
    metrics::set_active_signing_keys(active_count as u64);

    Ok(check)
}

/// Render a stored key as an RSA JWK.
pub fn to_json_web_key(key: &SigningKey) -> Result<JsonWebKey, AuthError> {
    let components = crypto::public_key_components(&key.public_key)?;

    Ok(JsonWebKey {
        kty: "RSA".to_string(),
        use_: "sig".to_string(),
        kid: key.key_id.clone(),
        alg: "RS256".to_string(),
        n: components.n,
        e: components.e,
    })
}

/// Keys published for verification at `now`, newest first.
///
/// Always the active key; retired-but-unexpired keys too unless
/// `publish_retired_keys` is off.
pub async fn published_keys<S: KeyStore + ?Sized>(
    store: &S,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Vec<SigningKey>, AuthError> {
    if config.publish_retired_keys {
        return store.list_unexpired_keys(now).await;
    }

    Ok(store
        .get_active_key()
        .await?
        .into_iter()
        .filter(|k| k.is_unexpired_at(now))
        .collect())
}

/// Get JWKS (JSON Web Key Set) for public key distribution
///
/// Output depends only on store state and `now`; private material never
/// leaves `SigningKey`.
#[instrument(skip_all)]
pub async fn get_jwks<S: KeyStore + ?Sized>(
    store: &S,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Jwks, AuthError> {
    let keys = published_keys(store, config, now).await?;

    let mut json_web_keys = Vec::with_capacity(keys.len());
    for key in &keys {
        match to_json_web_key(key) {
            Ok(jwk) => json_web_keys.push(jwk),
            Err(e) => {
                // One corrupt record must not take down publication of the rest
                tracing::error!(
                    target: "auth.key_management",
                    key_id = %key.key_id,
                    error = %e,
                    "Stored public key could not be encoded as a JWK"
                );
                metrics::record_key_store_anomaly("unreadable_public_key");
            }
        }
    }

    Ok(Jwks {
        keys: json_web_keys,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use base64::{engine::general_purpose, Engine as _};
    use std::collections::HashMap;

    fn test_config(publish_retired_keys: bool) -> Config {
        Config::from_vars(&HashMap::from([
            ("DATABASE_URL".to_string(), "postgresql://unused".to_string()),
            (
                "AUTH_MASTER_KEY".to_string(),
                general_purpose::STANDARD.encode([7u8; 32]),
            ),
            (
                "JWT_ISSUER".to_string(),
                "https://auth.example.com".to_string(),
            ),
            (
                "PUBLISH_RETIRED_KEYS".to_string(),
                publish_retired_keys.to_string(),
            ),
        ]))
        .expect("test config should load")
    }

    /// Key record with placeholder material; enough for lifecycle checks.
    fn stub_key(key_id: &str, is_active: bool, created_at: DateTime<Utc>) -> SigningKey {
        SigningKey {
            key_id: key_id.to_string(),
            public_key: vec![],
            private_key_encrypted: vec![],
            encryption_nonce: vec![0; 12],
            encryption_tag: vec![0; 16],
            is_active,
            created_at,
            expires_at: created_at + Duration::days(365),
        }
    }

    #[test]
    fn test_rotation_due_without_active_key() {
        assert!(rotation_due(None, Utc::now(), Duration::days(10)));
    }

    #[test]
    fn test_rotation_due_inside_lead_window() {
        let now = Utc::now();
        let mut key = stub_key("k1", true, now - Duration::days(360));
        key.expires_at = now + Duration::days(5);
        assert!(rotation_due(Some(&key), now, Duration::days(10)));
    }

    #[test]
    fn test_rotation_due_at_lead_boundary() {
        let now = Utc::now();
        let mut key = stub_key("k1", true, now);
        key.expires_at = now + Duration::days(10);
        assert!(rotation_due(Some(&key), now, Duration::days(10)));

        key.expires_at = now + Duration::days(10) + Duration::seconds(1);
        assert!(!rotation_due(Some(&key), now, Duration::days(10)));
    }

    #[test]
    fn test_rotation_due_when_window_passes_last_instant() {
        let now = Utc::now();
        let key = stub_key("k1", true, now);
        let beyond_calendar = Duration::try_days(100_000_000).unwrap();
        assert!(rotation_due(Some(&key), now, beyond_calendar));
    }

    #[test]
    fn test_generate_key_record_rejects_unrepresentable_expiry() {
        let now = Utc::now();
        let result = generate_key_record(
            2048,
            &[7u8; 32],
            Duration::try_days(100_000_000).unwrap(),
            now,
        );
        assert!(matches!(result, Err(AuthError::Internal)));
    }

    #[test]
    fn test_generate_key_record_is_inactive_and_wrapped() {
        let now = Utc::now();
        let key = generate_key_record(2048, &[7u8; 32], Duration::days(365), now).unwrap();

        assert!(!key.is_active);
        assert_eq!(key.expires_at, now + Duration::days(365));
        assert_eq!(key.encryption_nonce.len(), 12);
        assert_eq!(key.encryption_tag.len(), 16);

        let jwk = to_json_web_key(&key).unwrap();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.use_, "sig");
        assert_eq!(jwk.kid, key.key_id);
    }

    #[tokio::test]
    async fn test_rotate_if_due_bootstraps_empty_store() {
        let store = MemoryStore::new();
        let config = test_config(true);
        let now = Utc::now();

        let check = rotate_if_due(&store, &config, now).await.unwrap();

        let RotationCheck::Rotated {
            new_key_id,
            retired_key_id,
        } = check
        else {
            panic!("expected rotation, got {:?}", check);
        };
        assert!(retired_key_id.is_none());

        let active = store.get_active_key().await.unwrap().unwrap();
        assert_eq!(active.key_id, new_key_id);
        assert_eq!(active.expires_at, now + Duration::days(365));
    }

    #[tokio::test]
    async fn test_rotate_if_due_leaves_fresh_key_alone() {
        let store = MemoryStore::new();
        let config = test_config(true);
        let now = Utc::now();
        store.insert_key(&stub_key("fresh", true, now)).await.unwrap();

        let check = rotate_if_due(&store, &config, now).await.unwrap();

        assert_eq!(
            check,
            RotationCheck::NotDue {
                active_key_id: "fresh".to_string()
            }
        );
        assert_eq!(store.all_keys().len(), 1);
    }

    #[tokio::test]
    async fn test_rotate_if_due_replaces_key_near_expiry() {
        let store = MemoryStore::new();
        let config = test_config(true);
        let now = Utc::now();
        let mut old = stub_key("old", true, now - Duration::days(360));
        old.expires_at = now + Duration::days(5);
        store.insert_key(&old).await.unwrap();

        let check = rotate_if_due(&store, &config, now).await.unwrap();

        assert!(matches!(
            check,
            RotationCheck::Rotated { retired_key_id: Some(ref id), .. } if id == "old"
        ));
        let active = store.list_active_keys().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].key_id, "old");
        assert_eq!(active[0].expires_at, now + Duration::days(365));
        assert!(!store.get_by_key_id("old").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_rotate_if_due_propagates_store_failure() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let result = rotate_if_due(&store, &test_config(true), Utc::now()).await;
        assert!(matches!(result, Err(AuthError::Store(_))));
        assert!(store.all_keys().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_if_due_out_of_range_lead_time_is_internal_error() {
        let store = MemoryStore::new();
        let mut config = test_config(true);
        config.rotation_lead_time_seconds = i64::MAX;

        let result = rotate_if_due(&store, &config, Utc::now()).await;
        assert!(matches!(result, Err(AuthError::Internal)));
        assert!(store.all_keys().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_if_due_out_of_range_validity_is_internal_error() {
        let store = MemoryStore::new();
        let mut config = test_config(true);
        config.key_validity_days = i64::MAX;

        let result = rotate_if_due(&store, &config, Utc::now()).await;
        assert!(matches!(result, Err(AuthError::Internal)));
        assert!(store.all_keys().is_empty());
    }

    #[tokio::test]
    async fn test_jwks_includes_retired_unexpired_keys() {
        let store = MemoryStore::new();
        let config = test_config(true);
        let now = Utc::now();
        let mut old = generate_key_record(
            2048,
            &[7u8; 32],
            Duration::days(365),
            now - Duration::days(360),
        )
        .unwrap();
        old.expires_at = now + Duration::days(5);
        store.rotate(None, &old).await.unwrap();

        rotate_if_due(&store, &config, now).await.unwrap();

        let jwks = get_jwks(&store, &config, now).await.unwrap();
        assert_eq!(jwks.keys.len(), 2);
        // Newest (the active key) first
        assert_ne!(jwks.keys[0].kid, old.key_id);
        assert_eq!(jwks.keys[1].kid, old.key_id);
    }

    #[tokio::test]
    async fn test_jwks_skips_unreadable_key() {
        let store = MemoryStore::new();
        let config = test_config(true);
        let now = Utc::now();
        store.force_insert_key(stub_key("corrupt", false, now - Duration::days(1)));
        rotate_if_due(&store, &config, now).await.unwrap();

        let jwks = get_jwks(&store, &config, now).await.unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_ne!(jwks.keys[0].kid, "corrupt");
    }

    #[tokio::test]
    async fn test_jwks_active_only_when_retired_publication_disabled() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = generate_key_record(2048, &[7u8; 32], Duration::days(365), now).unwrap();
        store.rotate(None, &first).await.unwrap();
        let second = generate_key_record(2048, &[7u8; 32], Duration::days(365), now).unwrap();
        store.rotate(Some(&first.key_id), &second).await.unwrap();

        let with_retired = get_jwks(&store, &test_config(true), now).await.unwrap();
        assert_eq!(with_retired.keys.len(), 2);

        let active_only = get_jwks(&store, &test_config(false), now).await.unwrap();
        assert_eq!(active_only.keys.len(), 1);
        assert_eq!(active_only.keys[0].kid, second.key_id);
    }

    #[tokio::test]
    async fn test_jwks_is_deterministic_for_fixed_state() {
        let store = MemoryStore::new();
        let config = test_config(true);
        let now = Utc::now();
        rotate_if_due(&store, &config, now).await.unwrap();

        let first = get_jwks(&store, &config, now).await.unwrap();
        let second = get_jwks(&store, &config, now).await.unwrap();
        assert_eq!(first, second);

        let json = serde_json::to_string(&first).unwrap();
        assert!(!json.contains("private"));
        assert!(!json.contains("\"d\""));
    }

    #[tokio::test]
    async fn test_jwks_excludes_expired_keys() {
        let store = MemoryStore::new();
        let config = test_config(true);
        let now = Utc::now();
        rotate_if_due(&store, &config, now).await.unwrap();

        let after_expiry = now + Duration::days(366);
        let jwks = get_jwks(&store, &config, after_expiry).await.unwrap();
        assert!(jwks.keys.is_empty());
    }
}
