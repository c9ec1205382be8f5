//! User repository module for database operations.
//!
//! Users authenticate with email and password; role names are attached to
//! issued tokens.

use crate::errors::AuthError;
use crate::models::UserRecord;
use sqlx::PgPool;
use uuid::Uuid;

/// Get user by email, ignoring case.
///
/// The `users_email_lower_idx` unique index guarantees at most one match.
pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>, AuthError> {
    let user = sqlx::query_as::<_, UserRecord>(
        r#"
        SELECT user_id, email, first_name, password_hash
        FROM users
        WHERE lower(email) = lower($1)
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to fetch user by email: {}", e)))?;

    Ok(user)
}

/// Get the role names assigned to a user, in role id order.
pub async fn get_user_roles(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>, AuthError> {
    let roles: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT r.name
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.role_id
        WHERE ur.user_id = $1
        ORDER BY r.role_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to fetch user roles: {}", e)))?;

    Ok(roles.into_iter().map(|(name,)| name).collect())
}
