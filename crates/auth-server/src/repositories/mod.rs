//! Persistence seam.
//!
//! Services depend on the traits here, never on a concrete backend. `PgStore`
//! is the production implementation; `MemoryStore` backs tests and the test
//! harness.

pub mod clients;
pub mod memory;
pub mod postgres;
pub mod sessions;
pub mod signing_keys;
pub mod users;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::errors::AuthError;
use crate::models::{Client, PrincipalCredentials, Session, SigningKey};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of a compare-and-swap rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The new key is now the single active key.
    Rotated {
        new_key_id: String,
        retired_key_id: Option<String>,
    },
    /// The active key was no longer the expected one; nothing was written.
    Superseded { current_key_id: Option<String> },
}

/// Signing key persistence.
///
/// # Invariant
///
/// At most one key has `is_active = true`. `rotate` is the only operation
/// that moves the active marker and must be linearizable: of two concurrent
/// rotations expecting the same active key, exactly one succeeds.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The key new tokens are signed with, if any.
    ///
    /// If the store holds several active keys the most recently created one
    /// is returned and the anomaly is reported.
    async fn get_active_key(&self) -> Result<Option<SigningKey>, AuthError>;

    async fn get_by_key_id(&self, key_id: &str) -> Result<Option<SigningKey>, AuthError>;

    /// All keys marked active. More than one entry is an invariant violation.
    async fn list_active_keys(&self) -> Result<Vec<SigningKey>, AuthError>;

    /// Active and retired keys with `expires_at > now`, newest first.
    async fn list_unexpired_keys(&self, now: DateTime<Utc>)
        -> Result<Vec<SigningKey>, AuthError>;

    /// Insert a key. Inserting an active key while another is active fails.
    async fn insert_key(&self, key: &SigningKey) -> Result<(), AuthError>;

    /// Clear the active marker on `key_id`. The key stays available for
    /// verification until it expires.
    async fn deactivate_key(&self, key_id: &str) -> Result<(), AuthError>;

    /// Atomically retire `expected_active` and install `new_key` as active.
    ///
    /// `expected_active` is `None` when bootstrapping an empty store.
    async fn rotate(
        &self,
        expected_active: Option<&str>,
        new_key: &SigningKey,
    ) -> Result<RotationOutcome, AuthError>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> Result<(), AuthError>;
}

/// Append-only record of issued tokens.
#[async_trait]
pub trait SessionLedger: Send + Sync {
    async fn record_session(&self, session: &Session) -> Result<(), AuthError>;
}

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn get_by_client_id(&self, client_id: &str) -> Result<Option<Client>, AuthError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by email, ignoring case, together with role names.
    async fn get_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalCredentials>, AuthError>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Store: KeyStore + SessionLedger + ClientDirectory + UserDirectory {}

impl<T> Store for T where T: KeyStore + SessionLedger + ClientDirectory + UserDirectory {}

/// Pick the signing key from the set of keys marked active.
///
/// Expects `keys` ordered newest first.
pub(crate) fn select_active(mut keys: Vec<SigningKey>) -> Option<SigningKey> {
    if keys.len() > 1 {
        tracing::warn!(
            target: "auth.repository.signing_keys",
            active_count = keys.len(),
            key_ids = ?keys.iter().map(|k| k.key_id.as_str()).collect::<Vec<_>>(),
            "Multiple active signing keys found; using the most recently created"
        );
        metrics::record_key_store_anomaly("multiple_active");
    }

    if keys.is_empty() {
        None
    } else {
        Some(keys.swap_remove(0))
    }
}
