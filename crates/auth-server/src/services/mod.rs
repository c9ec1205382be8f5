pub mod introspection_service;
pub mod key_management_service;
pub mod token_service;
