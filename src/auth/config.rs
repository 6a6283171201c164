//! OAuth2 configuration
//!
//! Everything the OAuth client needs to talk to the GHL authorization server

use secrecy::{Secret, SecretString};

use crate::config::Settings;

pub const DEFAULT_AUTHORIZE_URL: &str = "https://marketplace.gohighlevel.com/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://services.leadconnectorhq.com/oauth/token";

/// Scopes requested by the sales bot install flow
pub const DEFAULT_SCOPES: &[&str] = &[
    "contacts.readonly",
    "contacts.write",
    "conversations.readonly",
    "conversations.write",
    "locations.readonly",
    "locations.write",
    "opportunities.readonly",
    "opportunities.write",
    "users.readonly",
    "users.write",
];

#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// Marketplace app client id
    pub client_id: String,

    /// Marketplace app client secret
    pub client_secret: SecretString,

    /// Callback URL registered in the marketplace app
    pub redirect_uri: String,

    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,

    /// Timeout applied by the HTTP client to each issuer request, in seconds
    pub request_timeout_secs: u64,
}

impl OAuth2Config {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            redirect_uri: redirect_uri.into(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: 10,
        }
    }

    /// Builds the config from the loaded application settings
    pub fn from_settings(settings: &Settings) -> Self {
        let ghl = &settings.ghl;
        let mut config = Self::new(&ghl.client_id, &ghl.client_secret, &ghl.redirect_uri);

        if let Some(url) = &ghl.authorize_url {
            config.authorize_url = url.clone();
        }
        if let Some(url) = &ghl.token_url {
            config.token_url = url.clone();
        }
        if let Some(scopes) = &ghl.scopes {
            config.scopes = scopes.clone();
        }
        config.request_timeout_secs = settings.oauth.attempt_timeout_secs;
        config
    }

    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// URL the operator opens to install the app on a location.
    ///
    /// `state` is echoed back on the callback and carries the tenant id.
    pub fn authorization_url(&self, state: Option<&str>) -> String {
        let mut url = format!(
            "{}?response_type=code&redirect_uri={}&client_id={}&scope={}",
            self.authorize_url,
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.scope_string())
        );

        if let Some(state) = state.filter(|s| !s.is_empty()) {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(state));
        }

        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url() {
        let config = OAuth2Config::new("test_client_id", "test_secret", "https://example.com/callback");

        let url = config.authorization_url(None);
        assert!(url.starts_with("https://marketplace.gohighlevel.com/oauth/authorize?response_type=code"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fexample.com%2Fcallback"));
        assert!(url.contains("scope=contacts.readonly%20contacts.write"));
        assert!(!url.contains("state="));
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let config = OAuth2Config::new("id", "secret", "https://example.com/callback");
        let url = config.authorization_url(Some("loc 1"));
        assert!(url.ends_with("&state=loc%201"));
    }

    #[test]
    fn test_debug_hides_client_secret() {
        let config = OAuth2Config::new("id", "very-secret-value", "https://example.com/callback");
        assert!(!format!("{:?}", config).contains("very-secret-value"));
    }
}
