//! Integration tests for GET /.well-known/jwks.json

use auth_server::models::Jwks;
use auth_test_utils::*;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::StatusCode;

async fn fetch_jwks(server: &TestAuthServer) -> Result<Jwks, anyhow::Error> {
    let response = reqwest::get(format!("{}/.well-known/jwks.json", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(response.json().await?)
}

#[tokio::test]
async fn test_jwks_publishes_active_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/.well-known/jwks.json", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("max-age=300")
    );

    let jwks: Jwks = response.json().await?;
    assert_eq!(jwks.keys.len(), 1);
    let jwk = &jwks.keys[0];
    assert_eq!(jwk.kid, server.active_key_id().await?);
    assert_eq!(jwk.kty, "RSA");
    assert_eq!(jwk.alg, "RS256");
    assert_eq!(jwk.use_, "sig");

    // 2048-bit modulus
    assert_eq!(URL_SAFE_NO_PAD.decode(&jwk.n)?.len(), 256);

    Ok(())
}

#[tokio::test]
async fn test_jwks_never_exposes_private_material() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let body: serde_json::Value =
        reqwest::get(format!("{}/.well-known/jwks.json", server.url()))
            .await?
            .json()
            .await?;

    let key = body["keys"][0].as_object().expect("key object");
    let mut fields: Vec<&str> = key.keys().map(String::as_str).collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["alg", "e", "kid", "kty", "n", "use"]);

    Ok(())
}

/// A relying party that only sees the JWKS can verify issued tokens.
#[tokio::test]
async fn test_token_verifies_against_published_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.login_token().await?;

    let jwks = fetch_jwks(&server).await?;
    let header = jsonwebtoken::decode_header(&token)?;
    let jwk = jwks
        .keys
        .iter()
        .find(|k| Some(&k.kid) == header.kid.as_ref())
        .expect("token kid must be published");

    let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[TEST_ISSUER]);
    validation.set_audience(&[TEST_CLIENT_URL_1]);

    let data = decode::<serde_json::Value>(&token, &decoding_key, &validation)?;
    assert_eq!(data.claims["sub"], TEST_USER_ALICE.to_string());

    Ok(())
}

#[tokio::test]
async fn test_jwks_includes_retired_key_after_rotation() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let old_key_id = server.active_key_id().await?;

    let new_key_id = server.rotate_now().await?;

    let jwks = fetch_jwks(&server).await?;
    let kids: Vec<&str> = jwks.keys.iter().map(|k| k.kid.as_str()).collect();
    assert_eq!(kids.len(), 2);
    assert!(kids.contains(&old_key_id.as_str()));
    assert!(kids.contains(&new_key_id.as_str()));

    Ok(())
}

#[tokio::test]
async fn test_jwks_active_only_when_retired_publication_disabled() -> Result<(), anyhow::Error> {
    let config = test_config_with(&[("PUBLISH_RETIRED_KEYS", "false")])?;
    let server = TestAuthServer::spawn_with_config(config).await?;

    let new_key_id = server.rotate_now().await?;

    let jwks = fetch_jwks(&server).await?;
    assert_eq!(jwks.keys.len(), 1);
    assert_eq!(jwks.keys[0].kid, new_key_id);

    Ok(())
}

#[tokio::test]
async fn test_jwks_empty_before_first_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn_without_key().await?;

    let jwks = fetch_jwks(&server).await?;

    assert!(jwks.keys.is_empty());

    Ok(())
}
