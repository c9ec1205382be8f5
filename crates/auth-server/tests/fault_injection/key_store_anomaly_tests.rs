//! Tests for a store that already violates the single-active-key invariant
//!
//! Such a store is repaired by the next rotation; until then the newest
//! active key signs and both keys verify.

use auth_server::repositories::KeyStore;
use auth_test_utils::*;
use chrono::{Duration, Utc};
use reqwest::StatusCode;

#[tokio::test]
async fn test_two_active_keys_sign_with_newest() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let original = server.active_key_id().await?;

    let mut newer = test_signing_key(Utc::now() + Duration::seconds(5))?;
    newer.is_active = true;
    server.store().force_insert_key(newer.clone());

    let token = server.login_token().await?;
    token.assert_signed_by(&newer.key_id);

    let old_token = TestTokenBuilder::new().sign_with(
        &server
            .store()
            .get_by_key_id(&original)
            .await?
            .expect("original key"),
    )?;
    assert!(server.is_active(&token).await?);
    assert!(server.is_active(&old_token).await?);

    Ok(())
}

#[tokio::test]
async fn test_rotation_repairs_two_active_keys() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let mut extra = test_signing_key(Utc::now() + Duration::seconds(5))?;
    extra.is_active = true;
    server.store().force_insert_key(extra);
    assert_eq!(server.store().list_active_keys().await?.len(), 2);

    let new_key_id = server.rotate_now().await?;

    let active = server.store().list_active_keys().await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].key_id, new_key_id);

    Ok(())
}

#[tokio::test]
async fn test_corrupt_public_key_is_skipped_in_jwks() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let active = server.active_key_id().await?;

    let mut corrupt = test_signing_key(Utc::now() - Duration::days(1))?;
    corrupt.public_key = vec![0xde, 0xad, 0xbe, 0xef];
    server.store().force_insert_key(corrupt);

    let response = reqwest::get(format!("{}/.well-known/jwks.json", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    let keys = body["keys"].as_array().expect("keys array");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kid"], active);

    Ok(())
}
