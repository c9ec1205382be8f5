use crate::errors::AuthError;
use crate::models::Client;
use sqlx::PgPool;

/// Get a registered client by its public identifier.
pub async fn get_by_client_id(pool: &PgPool, client_id: &str) -> Result<Option<Client>, AuthError> {
    let client = sqlx::query_as::<_, Client>(
        r#"
        SELECT client_id, name, client_url
        FROM clients
        WHERE client_id = $1
        "#,
    )
    .bind(client_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| AuthError::Store(format!("Failed to fetch client: {}", e)))?;

    Ok(client)
}
