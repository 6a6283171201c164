//! # GHL OAuth2 token lifecycle
//!
//! Owns everything about GHL credentials: the install flow, refresh, persistence and
//! invalidation. The rest of the service only asks the `TokenManager` for a valid token.
//!
//! ## Layout
//! - `config.rs`: client id/secret, URLs, scopes
//! - `client.rs`: token endpoint client (`OAuthExchange`)
//! - `credential.rs`: credential record and its stored form
//! - `store.rs`: durable credential storage
//! - `token_manager.rs`: cache, per-tenant locking, refresh and persistence
//! - `refresher.rs`: background refresh-ahead job
//! - `handlers.rs`: `/oauth/authorize` and `/oauth/callback`

pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod handlers;
pub mod refresher;
pub mod store;
pub mod token_manager;

pub use client::{OAuth2Client, OAuthExchange};
pub use config::OAuth2Config;
pub use credential::{Credential, StoredCredential, TokenGrant};
pub use error::{AuthError, AuthResult};
pub use handlers::{handle_oauth_callback, start_oauth_flow};
pub use refresher::TokenRefresher;
pub use store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};
pub use token_manager::{RefreshPolicy, TokenManager, TokenStatus};
