use crate::errors::AuthError;
use crate::models::{Client, Principal, PrincipalCredentials, Session, SigningKey, UserRecord};
use crate::repositories::{
    select_active, ClientDirectory, KeyStore, RotationOutcome, SessionLedger, UserDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Inner {
    keys: Vec<SigningKey>,
    clients: HashMap<String, Client>,
    users: Vec<(UserRecord, Vec<String>)>,
    sessions: Vec<Session>,
}

impl Inner {
    fn active_keys(&self) -> Vec<SigningKey> {
        let mut keys: Vec<SigningKey> = self.keys.iter().filter(|k| k.is_active).cloned().collect();
        sort_newest_first(&mut keys);
        keys
    }
}

/// Newest first; equal creation times fall back to descending key id.
fn sort_newest_first(keys: &mut [SigningKey]) {
    keys.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.key_id.cmp(&a.key_id))
    });
}

/// In-memory store.
///
/// All state sits behind one lock, so `rotate` is trivially linearizable.
/// `set_unavailable(true)` makes every operation fail with
/// `AuthError::Store` until cleared.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, client: Client) {
        self.inner
            .write()
            .clients
            .insert(client.client_id.clone(), client);
    }

    pub fn add_user(&self, user: UserRecord, roles: Vec<String>) {
        self.inner.write().users.push((user, roles));
    }

    /// Simulate the backing store going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of recorded sessions, in insertion order.
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.read().sessions.clone()
    }

    /// Snapshot of every stored key, in insertion order.
    pub fn all_keys(&self) -> Vec<SigningKey> {
        self.inner.read().keys.clone()
    }

    /// Insert a key without the single-active check, to reproduce a store
    /// that already violates it.
    pub fn force_insert_key(&self, key: SigningKey) {
        self.inner.write().keys.push(key);
    }

    fn check_available(&self) -> Result<(), AuthError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::Store("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get_active_key(&self) -> Result<Option<SigningKey>, AuthError> {
        self.check_available()?;
        let keys = self.inner.read().active_keys();
        Ok(select_active(keys))
    }

    async fn get_by_key_id(&self, key_id: &str) -> Result<Option<SigningKey>, AuthError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .keys
            .iter()
            .find(|k| k.key_id == key_id)
            .cloned())
    }

    async fn list_active_keys(&self) -> Result<Vec<SigningKey>, AuthError> {
        self.check_available()?;
        Ok(self.inner.read().active_keys())
    }

    async fn list_unexpired_keys(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SigningKey>, AuthError> {
        self.check_available()?;
        let mut keys: Vec<SigningKey> = self
            .inner
            .read()
            .keys
            .iter()
            .filter(|k| k.is_unexpired_at(now))
            .cloned()
            .collect();
        sort_newest_first(&mut keys);
        Ok(keys)
    }

    async fn insert_key(&self, key: &SigningKey) -> Result<(), AuthError> {
        self.check_available()?;
        let mut inner = self.inner.write();

        if inner.keys.iter().any(|k| k.key_id == key.key_id) {
            return Err(AuthError::Store(format!(
                "Duplicate signing key id: {}",
                key.key_id
            )));
        }
        if key.is_active && inner.keys.iter().any(|k| k.is_active) {
            return Err(AuthError::Store(
                "An active signing key already exists".to_string(),
            ));
        }

        inner.keys.push(key.clone());
        Ok(())
    }

    async fn deactivate_key(&self, key_id: &str) -> Result<(), AuthError> {
        self.check_available()?;
        let mut inner = self.inner.write();
        if let Some(key) = inner.keys.iter_mut().find(|k| k.key_id == key_id) {
            key.is_active = false;
        }
        Ok(())
    }

    async fn rotate(
        &self,
        expected_active: Option<&str>,
        new_key: &SigningKey,
    ) -> Result<RotationOutcome, AuthError> {
        self.check_available()?;
        let mut inner = self.inner.write();

        let current = inner.active_keys().into_iter().next().map(|k| k.key_id);
        if current.as_deref() != expected_active {
            return Ok(RotationOutcome::Superseded {
                current_key_id: current,
            });
        }

        for key in inner.keys.iter_mut() {
            key.is_active = false;
        }
        let mut active_key = new_key.clone();
        active_key.is_active = true;
        inner.keys.push(active_key);

        Ok(RotationOutcome::Rotated {
            new_key_id: new_key.key_id.clone(),
            retired_key_id: current,
        })
    }

    async fn ping(&self) -> Result<(), AuthError> {
        self.check_available()
    }
}

#[async_trait]
impl SessionLedger for MemoryStore {
    async fn record_session(&self, session: &Session) -> Result<(), AuthError> {
        self.check_available()?;
        self.inner.write().sessions.push(session.clone());
        Ok(())
    }
}

#[async_trait]
impl ClientDirectory for MemoryStore {
    async fn get_by_client_id(&self, client_id: &str) -> Result<Option<Client>, AuthError> {
        self.check_available()?;
        Ok(self.inner.read().clients.get(client_id).cloned())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalCredentials>, AuthError> {
        self.check_available()?;
        let wanted = email.to_lowercase();
        let inner = self.inner.read();

        Ok(inner
            .users
            .iter()
            .find(|(user, _)| user.email.to_lowercase() == wanted)
            .map(|(user, roles)| PrincipalCredentials {
                principal: Principal {
                    user_id: user.user_id,
                    email: user.email.clone(),
                    first_name: user.first_name.clone(),
                    roles: roles.clone(),
                },
                password_hash: user.password_hash.clone(),
            }))
    }
}
