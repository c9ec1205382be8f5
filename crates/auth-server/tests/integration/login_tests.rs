//! Integration tests for POST /api/auth/login

use auth_server::repositories::KeyStore;
use auth_test_utils::*;
use reqwest::StatusCode;

// ============================================================================
// Successful Login
// ============================================================================

#[tokio::test]
async fn test_login_returns_signed_token() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let active_key_id = server.active_key_id().await?;

    let response = server
        .login(TEST_USER_EMAIL, TEST_USER_PASSWORD, TEST_CLIENT_ID_1)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    let token = body["token"].as_str().expect("token field").to_string();

    token
        .assert_valid_jwt()
        .assert_signed_by(&active_key_id)
        .assert_for_subject(&TEST_USER_ALICE.to_string())
        .assert_for_audience(TEST_CLIENT_URL_1)
        .assert_has_role("Admin")
        .assert_has_role("User")
        .assert_expires_in(3600);

    Ok(())
}

#[tokio::test]
async fn test_login_audience_follows_client() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = server
        .login(TEST_USER_EMAIL, TEST_USER_PASSWORD, TEST_CLIENT_ID_2)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    body["token"]
        .as_str()
        .expect("token field")
        .to_string()
        .assert_for_audience(TEST_CLIENT_URL_2);

    Ok(())
}

#[tokio::test]
async fn test_login_email_is_case_insensitive() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = server
        .login("ALICE@Example.COM", TEST_USER_PASSWORD, TEST_CLIENT_ID_1)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_login_records_session() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let token = server.login_token().await?;

    let sessions = server.store().sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].user_id, TEST_USER_ALICE);
    assert_eq!(sessions[0].client_id, TEST_CLIENT_ID_1);
    assert_eq!(sessions[0].key_id, server.active_key_id().await?);
    assert_eq!(sessions[0].token, token);

    Ok(())
}

// ============================================================================
// Uniform Failures
// ============================================================================

#[tokio::test]
async fn test_login_failures_are_indistinguishable() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let cases = [
        ("unknown client", TEST_USER_EMAIL, TEST_USER_PASSWORD, "NoSuchClient"),
        ("unknown user", "bob@example.com", TEST_USER_PASSWORD, TEST_CLIENT_ID_1),
        ("wrong password", TEST_USER_EMAIL, "wrong-password", TEST_CLIENT_ID_1),
    ];

    let mut bodies = Vec::new();
    for (label, email, password, client_id) in cases {
        let response = server.login(email, password, client_id).await?;
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{label} should be 401"
        );
        bodies.push(response.text().await?);
    }

    assert!(
        bodies.iter().all(|b| b == &bodies[0]),
        "All credential failures must share one body: {bodies:?}"
    );
    assert!(bodies[0].contains("Invalid credentials"));
    assert!(server.store().sessions().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_login_rejects_malformed_body() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/login", server.url()))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_login_rejects_short_password_as_bad_request() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = server
        .login(TEST_USER_EMAIL, "12345", TEST_CLIENT_ID_1)
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_login_without_active_key_is_server_error() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn_without_key().await?;
    assert!(server.store().get_active_key().await?.is_none());

    let response = server
        .login(TEST_USER_EMAIL, TEST_USER_PASSWORD, TEST_CLIENT_ID_1)
        .await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "NO_ACTIVE_KEY");
    assert!(server.store().sessions().is_empty());

    Ok(())
}
