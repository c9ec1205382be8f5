//! Fixed test IDs for deterministic tests
//!
//! Client IDs and URLs match the rows seeded by the migrations.

use uuid::Uuid;

// Clients
pub const TEST_CLIENT_ID_1: &str = "Client1";
pub const TEST_CLIENT_URL_1: &str = "https://client1.com";
pub const TEST_CLIENT_ID_2: &str = "Client2";
pub const TEST_CLIENT_URL_2: &str = "https://client2.com";

// Users (100-199)
pub const TEST_USER_ALICE: Uuid = Uuid::from_u128(100);
pub const TEST_USER_EMAIL: &str = "alice@example.com";
pub const TEST_USER_FIRST_NAME: &str = "Alice";
pub const TEST_USER_PASSWORD: &str = "alice-password-1";
pub const TEST_USER_ROLES: [&str; 2] = ["Admin", "User"];

// Token issuer
pub const TEST_ISSUER: &str = "https://auth.test.local";
