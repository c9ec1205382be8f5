//! Integration tests for the operational endpoints

use auth_test_utils::*;
use reqwest::StatusCode;

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}

#[tokio::test]
async fn test_ready_with_active_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["signing_key"], "active");

    Ok(())
}

#[tokio::test]
async fn test_not_ready_without_active_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn_without_key().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["signing_key"], "missing");

    Ok(())
}

#[tokio::test]
async fn test_not_ready_when_store_unavailable() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    server.store().set_unavailable(true);

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["store"], "unhealthy");
    assert_eq!(body["error"], "Service dependencies unavailable");

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_renders_text() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    server.login_token().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_404() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/api/auth/logout", server.url())).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}
