use crate::errors::AuthError;
use crate::models::Session;
use sqlx::PgPool;

/// Record an issued token.
pub async fn record_session(pool: &PgPool, session: &Session) -> Result<(), AuthError> {
    sqlx::query(
        r#"
        INSERT INTO user_sessions (id, user_id, client_id, key_id, token, expires)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(session.id)
    .bind(session.user_id)
    .bind(&session.client_id)
    .bind(&session.key_id)
    .bind(&session.token)
    .bind(session.expires)
    .execute(pool)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to record session: {}", e)))?;

    Ok(())
}
