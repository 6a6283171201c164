//! OAuth credential record

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, Secret, SecretString};
use serde::{Deserialize, Serialize};

/// One OAuth credential for one tenant (GHL location).
///
/// Tokens are wrapped in `SecretString` so neither shows up in `Debug` output.
#[derive(Debug, Clone)]
pub struct Credential {
    pub tenant_id: String,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    pub user_type: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Token grant returned by the issuer, before it is bound to a tenant
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,
    /// Present when the issuer issued (or rotated) a refresh token
    pub refresh_token: Option<SecretString>,
    /// Lifetime reported by the issuer, in seconds
    pub expires_in: i64,
    pub scope: Option<String>,
    pub location_id: Option<String>,
    pub user_type: Option<String>,
}

impl Credential {
    /// Builds the initial credential from an authorization-code grant.
    ///
    /// Returns `None` when the issuer did not hand out a refresh token, since such a
    /// credential could never be renewed.
    pub fn from_grant(tenant_id: &str, grant: TokenGrant, now: DateTime<Utc>) -> Option<Self> {
        let refresh_token = grant.refresh_token?;
        Some(Self {
            tenant_id: tenant_id.to_string(),
            access_token: grant.access_token,
            refresh_token,
            expires_at: now + Duration::seconds(grant.expires_in),
            scope: grant.scope,
            user_type: grant.user_type,
            updated_at: now,
        })
    }

    /// Applies a refresh grant. A rotated refresh token replaces the old one, otherwise
    /// the current refresh token is kept.
    pub fn refreshed(&self, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or_else(|| self.refresh_token.clone()),
            expires_at: now + Duration::seconds(grant.expires_in),
            scope: grant.scope.or_else(|| self.scope.clone()),
            user_type: grant.user_type.or_else(|| self.user_type.clone()),
            updated_at: now,
        }
    }

    /// Usable while `now < expires_at - margin`
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now < self.expires_at - margin
    }

    pub fn is_usable(&self, margin: Duration) -> bool {
        self.is_usable_at(Utc::now(), margin)
    }

    /// Remaining lifetime, negative once expired
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }
}

/// Serialized form of a `Credential`, used by durable stores
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Credential> for StoredCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token.expose_secret().clone(),
            refresh_token: credential.refresh_token.expose_secret().clone(),
            expires_at: credential.expires_at,
            scope: credential.scope.clone(),
            user_type: credential.user_type.clone(),
            updated_at: credential.updated_at,
        }
    }
}

impl StoredCredential {
    pub fn into_credential(self, tenant_id: &str) -> Credential {
        Credential {
            tenant_id: tenant_id.to_string(),
            access_token: Secret::new(self.access_token),
            refresh_token: Secret::new(self.refresh_token),
            expires_at: self.expires_at,
            scope: self.scope,
            user_type: self.user_type,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenGrant {
        TokenGrant {
            access_token: Secret::new(access.to_string()),
            refresh_token: refresh.map(|r| Secret::new(r.to_string())),
            expires_in,
            scope: None,
            location_id: None,
            user_type: None,
        }
    }

    #[test]
    fn test_from_grant_requires_refresh_token() {
        let now = Utc::now();
        assert!(Credential::from_grant("loc", grant("a", None, 3600), now).is_none());

        let credential = Credential::from_grant("loc", grant("a", Some("r"), 3600), now).unwrap();
        assert_eq!(credential.expires_at, now + Duration::seconds(3600));
        assert_eq!(credential.refresh_token.expose_secret(), "r");
    }

    #[test]
    fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let now = Utc::now();
        let credential = Credential::from_grant("loc", grant("a1", Some("r1"), 60), now).unwrap();

        let refreshed = credential.refreshed(grant("a2", None, 3600), now);
        assert_eq!(refreshed.access_token.expose_secret(), "a2");
        assert_eq!(refreshed.refresh_token.expose_secret(), "r1");
    }

    #[test]
    fn test_refresh_takes_rotated_refresh_token() {
        let now = Utc::now();
        let credential = Credential::from_grant("loc", grant("a1", Some("r1"), 60), now).unwrap();

        let refreshed = credential.refreshed(grant("a2", Some("r2"), 3600), now);
        assert_eq!(refreshed.refresh_token.expose_secret(), "r2");
    }

    #[test]
    fn test_usable_window_honours_margin() {
        let now = Utc::now();
        let credential = Credential::from_grant("loc", grant("a", Some("r"), 90), now).unwrap();

        assert!(credential.is_usable_at(now, Duration::seconds(60)));
        assert!(!credential.is_usable_at(now + Duration::seconds(31), Duration::seconds(60)));
        assert!(!credential.is_usable_at(now + Duration::seconds(90), Duration::zero()));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credential = Credential::from_grant("loc", grant("top-secret-access", Some("top-secret-refresh"), 60), Utc::now()).unwrap();
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("top-secret-access"));
        assert!(!debug.contains("top-secret-refresh"));
    }

    #[test]
    fn test_stored_credential_conversion() {
        let credential = Credential::from_grant("loc", grant("a", Some("r"), 60), Utc::now()).unwrap();
        let stored = StoredCredential::from(&credential);
        assert_eq!(stored.access_token, "a");

        let back = stored.clone().into_credential("loc");
        assert_eq!(back.tenant_id, "loc");
        assert_eq!(back.expires_at, credential.expires_at);
    }
}
