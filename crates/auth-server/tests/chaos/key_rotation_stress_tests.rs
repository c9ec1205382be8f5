//! Key rotation stress tests
//!
//! Rotation must stay atomic while logins and other rotations run
//! concurrently: no request sees zero or two active keys, and every token
//! issued during the rotation stays verifiable.

use auth_server::repositories::KeyStore;
use auth_server::services::key_management_service::{self, RotationCheck};
use auth_test_utils::*;
use chrono::{Duration, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_during_rotation() -> Result<(), anyhow::Error> {
    let server = Arc::new(TestAuthServer::spawn().await?);
    let old_key_id = server.active_key_id().await?;

    let logins: Vec<_> = (0..100)
        .map(|_| {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let response = server
                    .login(TEST_USER_EMAIL, TEST_USER_PASSWORD, TEST_CLIENT_ID_1)
                    .await?;
                anyhow::ensure!(
                    response.status().is_success(),
                    "login failed with {}",
                    response.status()
                );
                let body: serde_json::Value = response.json().await?;
                body["token"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("no token in {body}"))
            })
        })
        .collect();

    let rotation = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.rotate_now().await })
    };

    let new_key_id = rotation.await.expect("rotation task should not panic")?;
    let tokens: Vec<String> = join_all(logins)
        .await
        .into_iter()
        .map(|r| r.expect("login task should not panic"))
        .collect::<Result<_, _>>()?;

    assert_eq!(tokens.len(), 100, "every login must succeed");

    let known: HashSet<&str> = [old_key_id.as_str(), new_key_id.as_str()].into();
    for token in &tokens {
        let kid = jsonwebtoken::decode_header(token)?
            .kid
            .expect("token must carry a kid");
        assert!(known.contains(kid.as_str()), "unexpected kid {kid}");
        assert!(server.is_active(token).await?, "token signed by {kid} inactive");
    }

    assert_eq!(server.store().list_active_keys().await?.len(), 1);
    assert_eq!(server.active_key_id().await?, new_key_id);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scheduler_checks_rotate_once() -> Result<(), anyhow::Error> {
    let server = Arc::new(TestAuthServer::spawn().await?);
    let old_key_id = server.active_key_id().await?;

    // Inside the lead window of the bootstrapped key
    let later = Utc::now() + Duration::days(360);

    let checks: Vec<_> = (0..8)
        .map(|_| {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                key_management_service::rotate_if_due(
                    server.store().as_ref(),
                    server.config(),
                    later,
                )
                .await
            })
        })
        .collect();

    let results: Vec<RotationCheck> = join_all(checks)
        .await
        .into_iter()
        .map(|r| r.expect("check task should not panic"))
        .collect::<Result<_, _>>()?;

    let rotated: Vec<&RotationCheck> = results
        .iter()
        .filter(|c| matches!(c, RotationCheck::Rotated { .. }))
        .collect();
    assert_eq!(rotated.len(), 1, "exactly one check may rotate: {results:?}");
    assert!(matches!(
        rotated[0],
        RotationCheck::Rotated { retired_key_id: Some(id), .. } if *id == old_key_id
    ));

    assert_eq!(server.store().list_active_keys().await?.len(), 1);
    // Losing attempts leave no orphaned keys behind
    assert_eq!(server.store().all_keys().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_tokens_from_every_generation_stay_active() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let mut tokens = vec![server.login_token().await?];
    for _ in 0..3 {
        server.rotate_now().await?;
        tokens.push(server.login_token().await?);
    }

    for token in &tokens {
        assert!(server.is_active(token).await?);
    }

    let body: serde_json::Value =
        reqwest::get(format!("{}/.well-known/jwks.json", server.url()))
            .await?
            .json()
            .await?;
    assert_eq!(body["keys"].as_array().map(Vec::len), Some(4));

    Ok(())
}
