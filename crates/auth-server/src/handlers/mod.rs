pub mod auth_handler;
pub mod health;
pub mod jwks_handler;
pub mod metrics;

pub use auth_handler::{handle_introspection, handle_login, AppState};
pub use health::{health_check, readiness_check};
pub use jwks_handler::handle_get_jwks;
pub use metrics::metrics_handler;
