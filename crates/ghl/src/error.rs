//! Error types for the ghl crate

use thiserror::Error;

/// Errors returned by the GHL API client
#[derive(Debug, Error)]
pub enum GhlError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API rejected the bearer token (HTTP 401)
    #[error("GHL API rejected the access token: {0}")]
    Unauthorized(String),

    /// Any other non-2xx response
    #[error("GHL API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Response body could not be parsed
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Client misconfiguration (bad base URL, builder failure)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Caller passed an unusable argument
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl GhlError {
    /// True when the failure means the access token is no longer accepted
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GhlError::Unauthorized(_))
    }
}

/// Result alias for the crate
pub type Result<T> = std::result::Result<T, GhlError>;
