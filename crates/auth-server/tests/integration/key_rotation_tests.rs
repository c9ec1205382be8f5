//! Integration tests for signing key rotation as seen over HTTP

use auth_server::repositories::KeyStore;
use auth_server::services::key_management_service::{self, RotationCheck};
use auth_test_utils::*;
use chrono::{Duration, Utc};

#[tokio::test]
async fn test_login_after_rotation_uses_new_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let old_key_id = server.active_key_id().await?;

    let before = server.login_token().await?;
    let new_key_id = server.rotate_now().await?;
    let after = server.login_token().await?;

    before.assert_signed_by(&old_key_id);
    after.assert_signed_by(&new_key_id);

    Ok(())
}

#[tokio::test]
async fn test_old_token_stays_active_after_rotation() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.login_token().await?;

    server.rotate_now().await?;
    server.rotate_now().await?;

    assert!(server.is_active(&token).await?);
    assert_eq!(server.store().list_active_keys().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_old_token_inactive_after_rotation_when_retired_keys_unpublished(
) -> Result<(), anyhow::Error> {
    let config = test_config_with(&[("PUBLISH_RETIRED_KEYS", "false")])?;
    let server = TestAuthServer::spawn_with_config(config).await?;
    let token = server.login_token().await?;

    server.rotate_now().await?;

    assert!(!server.is_active(&token).await?);

    Ok(())
}

/// The scheduler leaves a fresh key alone and replaces one that expires
/// inside the lead window.
#[tokio::test]
async fn test_scheduler_rotates_only_inside_lead_window() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let key_id = server.active_key_id().await?;
    let now = Utc::now();

    let check = key_management_service::rotate_if_due(server.store().as_ref(), server.config(), now)
        .await?;
    assert_eq!(
        check,
        RotationCheck::NotDue {
            active_key_id: key_id.clone()
        }
    );

    // 360 days later the key has 5 days left, inside the 10-day lead time
    let later = now + Duration::days(360);
    let check =
        key_management_service::rotate_if_due(server.store().as_ref(), server.config(), later)
            .await?;

    let RotationCheck::Rotated {
        new_key_id,
        retired_key_id,
    } = check
    else {
        panic!("expected rotation, got {check:?}");
    };
    assert_eq!(retired_key_id, Some(key_id));

    let active = server.store().get_active_key().await?.expect("active key");
    assert_eq!(active.key_id, new_key_id);
    assert_eq!(active.expires_at - active.created_at, Duration::days(365));

    Ok(())
}
