//! Client for the GoHighLevel (LeadConnector) API
//!
//! Covers the endpoints the sales bot needs:
//!
//! - Contacts: fetch a contact and resolve its pipeline
//! - Conversations: send outbound SMS
//!
//! The client never stores tokens. Callers pass a bearer token per request and react
//! to [`GhlError::Unauthorized`] by refreshing it.
//!
//! # Example
//!
//! ```rust,ignore
//! use ghl::GhlClient;
//!
//! let client = GhlClient::new()?;
//! let pipeline = client.get_contact_pipeline(&access_token, "contact-id").await?;
//! client.send_sms(&access_token, "contact-id", "Thanks for reaching out!").await?;
//! ```

pub mod client;
pub mod contacts;
pub mod conversations;
pub mod error;

pub use client::{GhlClient, DEFAULT_API_VERSION, DEFAULT_BASE_URL};
pub use contacts::pipeline_name;
pub use conversations::SentMessage;
pub use error::{GhlError, Result};
