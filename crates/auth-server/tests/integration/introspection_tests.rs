//! Integration tests for POST /api/auth/introspection
//!
//! Every validation failure answers 200 `{"active": false}`.

use auth_test_utils::*;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use std::time::Duration as StdDuration;

async fn introspection_body(
    server: &TestAuthServer,
    token: &str,
) -> Result<serde_json::Value, anyhow::Error> {
    let response = server.introspect(token).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(response.json().await?)
}

// ============================================================================
// Active Tokens
// ============================================================================

#[tokio::test]
async fn test_fresh_login_token_is_active() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.login_token().await?;

    let body = introspection_body(&server, &token).await?;

    assert_eq!(body["active"], true);
    assert_eq!(body["sub"], TEST_USER_ALICE.to_string());
    assert_eq!(body["aud"], TEST_CLIENT_URL_1);
    assert_eq!(body["iss"], TEST_ISSUER);
    assert_eq!(body["kid"], server.active_key_id().await?);

    Ok(())
}

#[tokio::test]
async fn test_token_expires_after_lifetime() -> Result<(), anyhow::Error> {
    let config = test_config_with(&[("TOKEN_LIFETIME_SECONDS", "1")])?;
    let server = TestAuthServer::spawn_with_config(config).await?;
    let token = server.login_token().await?;

    assert!(server.is_active(&token).await?);

    tokio::time::sleep(StdDuration::from_millis(1500)).await;

    let body = introspection_body(&server, &token).await?;
    assert_eq!(body, serde_json::json!({ "active": false }));

    Ok(())
}

// ============================================================================
// Expiry Boundary
// ============================================================================

#[tokio::test]
async fn test_token_expiring_this_second_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let key = server
        .store()
        .all_keys()
        .into_iter()
        .find(|k| k.is_active)
        .expect("active key");

    let now = Utc::now().timestamp();
    let token = TestTokenBuilder::new()
        .issued_at(now - 3600)
        .expires_at(now)
        .sign_with(&key)?;

    assert!(!server.is_active(&token).await?);

    Ok(())
}

#[tokio::test]
async fn test_token_expiring_next_minute_is_active() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let key = server
        .store()
        .all_keys()
        .into_iter()
        .find(|k| k.is_active)
        .expect("active key");

    let token = TestTokenBuilder::new().expires_in(60).sign_with(&key)?;

    assert!(server.is_active(&token).await?);

    Ok(())
}

// ============================================================================
// Rejected Tokens
// ============================================================================

#[tokio::test]
async fn test_tampered_claims_are_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.login_token().await?;

    let escalated = tamper_payload(&token, |claims| {
        claims["role"] = serde_json::json!(["Admin", "Editor", "User", "Root"]);
    });
    let other_user = tamper_payload(&token, |claims| {
        claims["sub"] = serde_json::json!("00000000-0000-0000-0000-000000000001");
    });
    let extended = tamper_payload(&token, |claims| {
        claims["exp"] = serde_json::json!(Utc::now().timestamp() + 86_400 * 365);
    });

    for tampered in [escalated, other_user, extended] {
        let body = introspection_body(&server, &tampered).await?;
        assert_eq!(body, serde_json::json!({ "active": false }));
    }

    Ok(())
}

#[tokio::test]
async fn test_mutated_signature_bytes_are_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.login_token().await?;
    assert!(server.is_active(&token).await?);

    let signature_start = token.rfind('.').expect("signature segment") + 1;
    let signature_len = token.len() - signature_start;

    // The final character may carry only padding bits, so stay clear of it
    for offset in [0, signature_len / 2, signature_len - 2] {
        let mut bytes = token.clone().into_bytes();
        let index = signature_start + offset;
        bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
        let mutated = String::from_utf8(bytes)?;

        let body = introspection_body(&server, &mutated).await?;
        assert_eq!(
            body,
            serde_json::json!({ "active": false }),
            "signature byte {offset} mutated"
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_truncated_signature_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.login_token().await?;

    let truncated = &token[..token.len() - 4];

    assert!(!server.is_active(truncated).await?);

    Ok(())
}

#[tokio::test]
async fn test_wrong_issuer_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let key = server
        .store()
        .all_keys()
        .into_iter()
        .find(|k| k.is_active)
        .expect("active key");

    let token = TestTokenBuilder::new()
        .issued_by("https://impostor.example")
        .sign_with(&key)?;

    assert!(!server.is_active(&token).await?);

    Ok(())
}

#[tokio::test]
async fn test_token_issued_far_in_future_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let key = server
        .store()
        .all_keys()
        .into_iter()
        .find(|k| k.is_active)
        .expect("active key");

    let later = Utc::now() + Duration::hours(2);
    let token = TestTokenBuilder::new()
        .issued_at(later.timestamp())
        .expires_at((later + Duration::hours(1)).timestamp())
        .sign_with(&key)?;

    assert!(!server.is_active(&token).await?);

    Ok(())
}

#[tokio::test]
async fn test_token_from_unknown_key_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let stranger = test_signing_key(Utc::now())?;

    let token = TestTokenBuilder::new().sign_with(&stranger)?;

    assert!(!server.is_active(&token).await?);

    Ok(())
}

#[tokio::test]
async fn test_token_from_expired_key_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let mut old_key = test_signing_key(Utc::now() - Duration::days(400))?;
    old_key.is_active = false;
    server.store().force_insert_key(old_key.clone());

    let token = TestTokenBuilder::new().sign_with(&old_key)?;

    assert!(!server.is_active(&token).await?);

    Ok(())
}

// ============================================================================
// Request Handling
// ============================================================================

#[tokio::test]
async fn test_garbage_input_is_inactive_not_error() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let oversized = "a".repeat(10_000);
    for token in ["", "garbage", "a.b.c", "....", oversized.as_str()] {
        let body = introspection_body(&server, token).await?;
        assert_eq!(
            body,
            serde_json::json!({ "active": false }),
            "{token:.20} should be inactive"
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_missing_token_field_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/introspection", server.url()))
        .form(&[("not_token", "x")])
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body, serde_json::json!({ "active": false }));

    Ok(())
}

#[tokio::test]
async fn test_json_body_is_inactive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.login_token().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/introspection", server.url()))
        .json(&serde_json::json!({ "token": token }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body, serde_json::json!({ "active": false }));

    Ok(())
}
