use crate::errors::AuthError;
use crate::models::SigningKey;
use crate::repositories::RotationOutcome;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

/// Advisory lock id serializing rotations across replicas.
const ROTATION_LOCK_ID: i64 = 0x6b65_795f_726f_7461;

const SIGNING_KEY_COLUMNS: &str = r#"
    key_id, public_key, private_key_encrypted, encryption_nonce, encryption_tag,
    is_active, created_at, expires_at
"#;

/// Insert a signing key
pub async fn insert_key(pool: &PgPool, key: &SigningKey) -> Result<(), AuthError> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| AuthError::Store(format!("Failed to acquire connection: {}", e)))?;

    insert_with(&mut conn, key).await
}

async fn insert_with(
    conn: &mut sqlx::PgConnection,
    key: &SigningKey,
) -> Result<(), AuthError> {
    sqlx::query(
        r#"
        INSERT INTO signing_keys (
            key_id, public_key, private_key_encrypted, encryption_nonce, encryption_tag,
            is_active, created_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&key.key_id)
    .bind(&key.public_key)
    .bind(&key.private_key_encrypted)
    .bind(&key.encryption_nonce)
    .bind(&key.encryption_tag)
    .bind(key.is_active)
    .bind(key.created_at)
    .bind(key.expires_at)
    .execute(conn)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to insert signing key: {}", e)))?;

    Ok(())
}

/// Get every key marked active, newest first
pub async fn list_active_keys(pool: &PgPool) -> Result<Vec<SigningKey>, AuthError> {
    let keys = sqlx::query_as::<_, SigningKey>(&format!(
        "SELECT {} FROM signing_keys WHERE is_active = true ORDER BY created_at DESC, key_id DESC",
        SIGNING_KEY_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to fetch active keys: {}", e)))?;

    Ok(keys)
}

/// Get signing key by key_id
pub async fn get_by_key_id(pool: &PgPool, key_id: &str) -> Result<Option<SigningKey>, AuthError> {
    let key = sqlx::query_as::<_, SigningKey>(&format!(
        "SELECT {} FROM signing_keys WHERE key_id = $1",
        SIGNING_KEY_COLUMNS
    ))
    .bind(key_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to fetch key by id: {}", e)))?;

    Ok(key)
}

/// Get all keys that can still verify signatures at `now` (for JWKS)
pub async fn list_unexpired_keys(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<SigningKey>, AuthError> {
    let keys = sqlx::query_as::<_, SigningKey>(&format!(
        "SELECT {} FROM signing_keys WHERE expires_at > $1 ORDER BY created_at DESC, key_id DESC",
        SIGNING_KEY_COLUMNS
    ))
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to fetch unexpired keys: {}", e)))?;

    Ok(keys)
}

/// Mark a key inactive
pub async fn deactivate_key(pool: &PgPool, key_id: &str) -> Result<(), AuthError> {
    sqlx::query("UPDATE signing_keys SET is_active = false WHERE key_id = $1")
        .bind(key_id)
        .execute(pool)
        .await
        .map_err(|e| AuthError::Store(format!("Failed to deactivate key: {}", e)))?;

    Ok(())
}

/// Retire the expected active key and install `new_key` in one transaction.
///
/// The advisory lock serializes concurrent rotations; the partial unique
/// index on `is_active` rejects any writer that bypasses it.
pub async fn rotate_key(
    pool: &PgPool,
    expected_active: Option<&str>,
    new_key: &SigningKey,
) -> Result<RotationOutcome, AuthError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AuthError::Store(format!("Failed to start transaction: {}", e)))?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ROTATION_LOCK_ID)
        .execute(&mut *tx)
        .await
        .map_err(|e| AuthError::Store(format!("Failed to take rotation lock: {}", e)))?;

    let current = current_active_ids(&mut tx).await?;
    let current_first = current.first().cloned();

    if current_first.as_deref() != expected_active {
        // Dropping the transaction rolls back and releases the lock
        return Ok(RotationOutcome::Superseded {
            current_key_id: current_first,
        });
    }

    // Clears every active marker, including duplicates left by an earlier fault
    sqlx::query("UPDATE signing_keys SET is_active = false WHERE is_active = true")
        .execute(&mut *tx)
        .await
        .map_err(|e| AuthError::Store(format!("Failed to deactivate old keys: {}", e)))?;

    let mut active_key = new_key.clone();
    active_key.is_active = true;
    insert_with(&mut tx, &active_key).await?;

    tx.commit()
        .await
        .map_err(|e| AuthError::Store(format!("Failed to commit rotation: {}", e)))?;

    Ok(RotationOutcome::Rotated {
        new_key_id: new_key.key_id.clone(),
        retired_key_id: current_first,
    })
}

async fn current_active_ids(
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Vec<String>, AuthError> {
    let ids: Vec<(String,)> = sqlx::query_as(
        "SELECT key_id FROM signing_keys WHERE is_active = true ORDER BY created_at DESC, key_id DESC",
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to read active key: {}", e)))?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}
