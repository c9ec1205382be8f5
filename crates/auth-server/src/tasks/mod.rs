//! Background tasks for the auth server.
//!
//! # Tasks
//!
//! - `key_rotation` - Keeps exactly one unexpired signing key active

pub mod key_rotation;

pub use key_rotation::start_key_rotation;
