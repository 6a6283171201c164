//! Error taxonomy for the OAuth token lifecycle

use thiserror::Error;

/// Errors produced by the OAuth client, the credential store and the token manager
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    /// No credential exists for the tenant, or it was revoked. Run the OAuth flow.
    #[error("tenant '{tenant_id}' is not authorized; re-run the GHL OAuth flow")]
    NotAuthorized { tenant_id: String },

    /// The authorization-code exchange was rejected by the issuer
    #[error("authorization code exchange rejected: {0}")]
    AuthorizationFailed(String),

    /// The issuer rejected the refresh token (revoked, expired or rotated elsewhere)
    #[error("refresh token rejected by issuer: {0}")]
    InvalidGrant(String),

    /// Transient refresh failures exhausted the retry budget
    #[error("token refresh failed after {attempts} attempt(s): {reason}")]
    RefreshFailed { attempts: u32, reason: String },

    /// The issuer answered with something that is not a usable token response
    #[error("malformed issuer response: {0}")]
    ProtocolError(String),

    /// The credential store is unavailable
    #[error("credential storage error: {0}")]
    StorageError(String),

    /// Network error, timeout, 5xx or throttling from the issuer. Retried internally.
    #[error("transient issuer error: {0}")]
    Transient(String),

    /// Input rejected before any network call
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AuthError {
    /// Failures that retrying cannot fix: an operator must re-authorize the integration
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, AuthError::NotAuthorized { .. } | AuthError::InvalidGrant(_))
    }

    /// Failures the refresh loop retries with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Transient(_) | AuthError::ProtocolError(_))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Transient(format!("issuer request timed out: {}", err))
        } else {
            AuthError::Transient(format!("issuer request failed: {}", err))
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reauthorization_classification() {
        assert!(AuthError::NotAuthorized { tenant_id: "loc".into() }.requires_reauthorization());
        assert!(AuthError::InvalidGrant("revoked".into()).requires_reauthorization());
        assert!(!AuthError::RefreshFailed { attempts: 3, reason: "timeout".into() }.requires_reauthorization());
        assert!(!AuthError::StorageError("disk full".into()).requires_reauthorization());
    }

    #[test]
    fn test_transient_classification() {
        assert!(AuthError::Transient("502".into()).is_transient());
        assert!(AuthError::ProtocolError("missing access_token".into()).is_transient());
        assert!(!AuthError::InvalidGrant("revoked".into()).is_transient());
        assert!(!AuthError::AuthorizationFailed("bad code".into()).is_transient());
    }

    #[test]
    fn test_not_authorized_message_names_tenant() {
        let err = AuthError::NotAuthorized { tenant_id: "loc-123".into() };
        assert!(err.to_string().contains("loc-123"));
    }
}
