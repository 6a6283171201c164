use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

use crate::auth::AuthError;

#[derive(Debug)]
pub enum AppError {
    Auth(AuthError),
    GhlApi(String),
    ConfigError(String),
    JsonError(serde_json::Error),
    HttpError(reqwest::Error),
    ValidationError(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Auth(err) => write!(f, "Authorization error: {}", err),
            AppError::GhlApi(msg) => write!(f, "GHL API error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::JsonError(err) => write!(f, "JSON error: {}", err),
            AppError::HttpError(err) => write!(f, "HTTP error: {}", err),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::HttpError(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ghl::GhlError> for AppError {
    fn from(err: ghl::GhlError) -> Self {
        match err {
            ghl::GhlError::ValidationError(msg) => AppError::ValidationError(msg),
            other => AppError::GhlApi(other.to_string()),
        }
    }
}

/// HTTP status for each token lifecycle failure
pub fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::NotAuthorized { .. } | AuthError::InvalidGrant(_) => StatusCode::UNAUTHORIZED,
        AuthError::AuthorizationFailed(_) | AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AuthError::RefreshFailed { .. } | AuthError::ProtocolError(_) | AuthError::Transient(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AuthError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Auth(err) => (auth_error_status(&err), err.to_string()),
            AppError::GhlApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::JsonError(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::HttpError(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = json!({
            "error": error_message,
            "status": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
