//! Test server harness for E2E testing
//!
//! Provides TestAuthServer for spawning real auth server instances in tests.
//! The server runs the production router over a `MemoryStore` seeded with the
//! fixture clients and user.

use crate::crypto_fixtures::{test_config, TEST_BCRYPT_COST};
use crate::test_ids::*;
use auth_server::config::Config;
use auth_server::handlers::AppState;
use auth_server::models::{Client, UserRecord};
use auth_server::observability::metrics::init_metrics_recorder;
use auth_server::repositories::{KeyStore, MemoryStore, RotationOutcome, Store};
use auth_server::routes;
use auth_server::services::key_management_service;
use chrono::{Duration, Utc};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the auth server in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_login_e2e() -> Result<()> {
///     let server = TestAuthServer::spawn().await?;
///
///     let response = server
///         .login(TEST_USER_EMAIL, TEST_USER_PASSWORD, TEST_CLIENT_ID_1)
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestAuthServer {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    config: Arc<Config>,
    client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestAuthServer {
    /// Spawn a server with the default test config and one active key.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_config(test_config()?).await
    }

    /// Spawn a server with `config` and one active key.
    pub async fn spawn_with_config(config: Config) -> Result<Self, anyhow::Error> {
        let store = Arc::new(seeded_store()?);

        key_management_service::rotate_if_due(store.as_ref(), &config, Utc::now())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bootstrap signing key: {}", e))?;

        Self::serve(store, config).await
    }

    /// Spawn a server whose store has the fixture data but no signing key.
    pub async fn spawn_without_key() -> Result<Self, anyhow::Error> {
        Self::serve(Arc::new(seeded_store()?), test_config()?).await
    }

    async fn serve(store: Arc<MemoryStore>, config: Config) -> Result<Self, anyhow::Error> {
        let config = Arc::new(config);

        let state = Arc::new(AppState {
            store: Arc::clone(&store) as Arc<dyn Store>,
            config: Arc::clone(&config),
        });

        // The global recorder can only be installed once per process. Later
        // servers get a standalone recorder.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            config,
            client: reqwest::Client::new(),
            _handle: handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the backing store, for inspecting or manipulating state directly
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Get reference to the server configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// POST /api/auth/login
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client_id: &str,
    ) -> Result<reqwest::Response, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/api/auth/login", self.url()))
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "clientId": client_id,
            }))
            .send()
            .await?;

        Ok(response)
    }

    /// Log in as the fixture user for Client1 and return the token.
    pub async fn login_token(&self) -> Result<String, anyhow::Error> {
        let response = self
            .login(TEST_USER_EMAIL, TEST_USER_PASSWORD, TEST_CLIENT_ID_1)
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Login failed with status {}", response.status());
        }

        let body: serde_json::Value = response.json().await?;
        body["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Login response has no token: {}", body))
    }

    /// POST /api/auth/introspection with `token` as the form field
    pub async fn introspect(&self, token: &str) -> Result<reqwest::Response, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/api/auth/introspection", self.url()))
            .form(&[("token", token)])
            .send()
            .await?;

        Ok(response)
    }

    /// Introspect and return the `active` flag.
    pub async fn is_active(&self, token: &str) -> Result<bool, anyhow::Error> {
        let response = self.introspect(token).await?;

        if !response.status().is_success() {
            anyhow::bail!("Introspection failed with status {}", response.status());
        }

        let body: serde_json::Value = response.json().await?;
        body["active"]
            .as_bool()
            .ok_or_else(|| anyhow::anyhow!("Introspection response has no active flag: {}", body))
    }

    /// Id of the currently active key.
    pub async fn active_key_id(&self) -> Result<String, anyhow::Error> {
        self.store
            .get_active_key()
            .await?
            .map(|k| k.key_id)
            .ok_or_else(|| anyhow::anyhow!("No active signing key"))
    }

    /// Rotate immediately, regardless of the active key's age.
    ///
    /// Returns the new active key id.
    pub async fn rotate_now(&self) -> Result<String, anyhow::Error> {
        let current = self.store.get_active_key().await?.map(|k| k.key_id);

        let new_key = key_management_service::generate_key_record(
            self.config.key_size_bits,
            self.config.master_key.expose_secret(),
            Duration::days(self.config.key_validity_days),
            Utc::now(),
        )?;

        match self.store.rotate(current.as_deref(), &new_key).await? {
            RotationOutcome::Rotated { new_key_id, .. } => Ok(new_key_id),
            RotationOutcome::Superseded { current_key_id } => {
                anyhow::bail!("Rotation superseded by {:?}", current_key_id)
            }
        }
    }
}

impl Drop for TestAuthServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

/// Store holding both fixture clients and the fixture user.
fn seeded_store() -> Result<MemoryStore, anyhow::Error> {
    let store = MemoryStore::new();

    store.add_client(Client {
        client_id: TEST_CLIENT_ID_1.to_string(),
        name: "Client Application 1".to_string(),
        client_url: TEST_CLIENT_URL_1.to_string(),
    });
    store.add_client(Client {
        client_id: TEST_CLIENT_ID_2.to_string(),
        name: "Client Application 2".to_string(),
        client_url: TEST_CLIENT_URL_2.to_string(),
    });

    store.add_user(
        UserRecord {
            user_id: TEST_USER_ALICE,
            email: TEST_USER_EMAIL.to_string(),
            first_name: TEST_USER_FIRST_NAME.to_string(),
            password_hash: bcrypt::hash(TEST_USER_PASSWORD, TEST_BCRYPT_COST)?,
        },
        TEST_USER_ROLES.iter().map(|r| r.to_string()).collect(),
    );

    Ok(store)
}
