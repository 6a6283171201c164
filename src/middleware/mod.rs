//! Middleware layer for the Axum router
//!
//! - Admin endpoint authentication

pub mod admin_auth;

pub use admin_auth::require_admin_key;
