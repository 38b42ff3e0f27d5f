//! Configuration for the WHOOP OAuth proxy.

use std::path::PathBuf;
use std::time::Duration;

/// Provider and API configuration constants.
pub mod api {
    use std::time::Duration;

    /// WHOOP OAuth 2.0 authorization endpoint (user redirect target).
    pub const AUTHORIZE_URL: &str = "https://api.prod.whoop.com/oauth/oauth2/auth";

    /// WHOOP OAuth 2.0 token endpoint (code exchange and refresh).
    pub const TOKEN_URL: &str = "https://api.prod.whoop.com/oauth/oauth2/token";

    /// Versioned root of the WHOOP developer API.
    pub const API_ROOT: &str = "https://api.prod.whoop.com/developer/v1";

    /// Scopes requested on every authorization.
    pub const SCOPES: &[&str] = &[
        "read:recovery",
        "read:cycles",
        "read:workout",
        "read:sleep",
        "read:profile",
        "read:body_measurement",
    ];

    /// Request timeout for provider and resource calls.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Retries for transient resource GET failures. The token endpoint is never retried.
    pub const MAX_RESOURCE_RETRIES: u32 = 2;

    /// Default token log location.
    pub const DEFAULT_STORE_PATH: &str = "whoop-tokens.jsonl";
}

/// Proxy configuration.
#[derive(Clone)]
pub struct Config {
    /// OAuth client identifier issued by WHOOP.
    pub client_id: String,

    /// OAuth client secret. Never printed by `Debug`.
    pub client_secret: String,

    /// Redirect URI registered with the provider (points at `/callback`).
    pub redirect_uri: String,

    /// Authorization endpoint (overridable for mock servers).
    pub authorize_url: String,

    /// Token endpoint (overridable for mock servers).
    pub token_url: String,

    /// API root that resource paths are joined onto.
    pub api_root: String,

    /// Token log file.
    pub store_path: PathBuf,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Retries for transient resource GET failures.
    pub max_resource_retries: u32,
}

impl Config {
    /// Create a configuration for the production WHOOP endpoints.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorize_url: api::AUTHORIZE_URL.to_string(),
            token_url: api::TOKEN_URL.to_string(),
            api_root: api::API_ROOT.to_string(),
            store_path: PathBuf::from(api::DEFAULT_STORE_PATH),
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            max_resource_retries: api::MAX_RESOURCE_RETRIES,
        }
    }

    /// Create a test configuration with every endpoint under `base_url`.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "http://localhost:4000/callback".to_string(),
            authorize_url: format!("{}/oauth/oauth2/auth", base_url),
            token_url: format!("{}/oauth/oauth2/token", base_url),
            api_root: format!("{}/developer/v1", base_url),
            store_path: std::env::temp_dir().join("whoop-proxy-test-tokens.jsonl"),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            max_resource_retries: 0, // Deterministic call counts in tests
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `CLIENT_ID`, `CLIENT_SECRET`, `REDIRECT_URI` and optionally
    /// `TOKEN_STORE_PATH`.
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let client_id = required_env("CLIENT_ID")?;
        let client_secret = required_env("CLIENT_SECRET")?;
        let redirect_uri = required_env("REDIRECT_URI")?;

        let mut config = Self::new(client_id, client_secret, redirect_uri);
        if let Ok(path) = std::env::var("TOKEN_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        Ok(config)
    }

    /// Replace the token log location.
    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Space-separated scope list sent to the authorization endpoint.
    #[must_use]
    pub fn scope(&self) -> String {
        api::SCOPES.join(" ")
    }
}

fn required_env(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => anyhow::bail!("missing required environment variable {name}"),
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("api_root", &self.api_root)
            .field("store_path", &self.store_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_uses_production_endpoints() {
        let config = Config::new("id", "secret", "https://proxy.example/callback");
        assert_eq!(config.token_url, api::TOKEN_URL);
        assert_eq!(config.authorize_url, api::AUTHORIZE_URL);
        assert_eq!(config.api_root, api::API_ROOT);
    }

    #[test]
    fn test_scope_is_space_separated() {
        let config = Config::new("id", "secret", "uri");
        assert_eq!(
            config.scope(),
            "read:recovery read:cycles read:workout read:sleep read:profile read:body_measurement"
        );
    }

    #[test]
    fn test_for_testing_points_at_base_url() {
        let config = Config::for_testing("http://127.0.0.1:9999");
        assert_eq!(config.token_url, "http://127.0.0.1:9999/oauth/oauth2/token");
        assert_eq!(config.api_root, "http://127.0.0.1:9999/developer/v1");
        assert_eq!(config.max_resource_retries, 0);
    }

    #[test]
    fn test_debug_hides_client_secret() {
        let config = Config::new("id", "super-secret-value", "uri");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("client_id"));
    }
}
