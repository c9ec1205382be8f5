//! # Auth Test Utilities
//!
//! Shared test utilities for the auth server.
//!
//! This crate provides:
//! - Crypto fixtures (test master key, test config, signing keys)
//! - Test data builders (TestTokenBuilder)
//! - Server test harness (TestAuthServer for E2E tests over an in-memory store)
//! - Fixed test IDs (clients, users, credentials)
//! - Custom assertions (TokenAssertions trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestAuthServer::spawn().await?;
//!     let token = server.login_token().await?;
//!
//!     token
//!         .assert_valid_jwt()
//!         .assert_for_audience(TEST_CLIENT_URL_1);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod server_harness;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use test_ids::*;
pub use token_builders::*;
