use crate::errors::AuthError;
use crate::models::{Client, Principal, PrincipalCredentials, Session, SigningKey};
use crate::repositories::{
    clients, select_active, sessions, signing_keys, users, ClientDirectory, KeyStore,
    RotationOutcome, SessionLedger, UserDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyStore for PgStore {
    async fn get_active_key(&self) -> Result<Option<SigningKey>, AuthError> {
        let keys = signing_keys::list_active_keys(&self.pool).await?;
        Ok(select_active(keys))
    }

    async fn get_by_key_id(&self, key_id: &str) -> Result<Option<SigningKey>, AuthError> {
        signing_keys::get_by_key_id(&self.pool, key_id).await
    }

    async fn list_active_keys(&self) -> Result<Vec<SigningKey>, AuthError> {
        signing_keys::list_active_keys(&self.pool).await
    }

    async fn list_unexpired_keys(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SigningKey>, AuthError> {
        signing_keys::list_unexpired_keys(&self.pool, now).await
    }

    async fn insert_key(&self, key: &SigningKey) -> Result<(), AuthError> {
        signing_keys::insert_key(&self.pool, key).await
    }

    async fn deactivate_key(&self, key_id: &str) -> Result<(), AuthError> {
        signing_keys::deactivate_key(&self.pool, key_id).await
    }

    async fn rotate(
        &self,
        expected_active: Option<&str>,
        new_key: &SigningKey,
    ) -> Result<RotationOutcome, AuthError> {
        signing_keys::rotate_key(&self.pool, expected_active, new_key).await
    }

    async fn ping(&self) -> Result<(), AuthError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("Ping failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl SessionLedger for PgStore {
    async fn record_session(&self, session: &Session) -> Result<(), AuthError> {
        sessions::record_session(&self.pool, session).await
    }
}

#[async_trait]
impl ClientDirectory for PgStore {
    async fn get_by_client_id(&self, client_id: &str) -> Result<Option<Client>, AuthError> {
        clients::get_by_client_id(&self.pool, client_id).await
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalCredentials>, AuthError> {
        let Some(user) = users::get_by_email(&self.pool, email).await? else {
            return Ok(None);
        };

        let roles = users::get_user_roles(&self.pool, user.user_id).await?;

        Ok(Some(PrincipalCredentials {
            principal: Principal {
                user_id: user.user_id,
                email: user.email,
                first_name: user.first_name,
                roles,
            },
            password_hash: user.password_hash,
        }))
    }
}
