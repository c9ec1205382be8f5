//! Auth Server Library
//!
//! Issues RS256 user tokens, rotates the signing keys behind them, publishes
//! the verification keys as a JWKS and answers token introspection.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - RSA key generation, key wrapping, JWT signing and verification
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP middleware
//! - `models` - Data models
//! - `observability` - Metrics and log correlation helpers
//! - `repositories` - Persistence traits and backends
//! - `routes` - Router assembly
//! - `services` - Business logic layer
//! - `tasks` - Background tasks

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
