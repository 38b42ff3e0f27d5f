//! Outbound HTTP to the WHOOP identity provider and developer API.
//!
//! Provides async HTTP client with:
//! - Connection pooling via reqwest
//! - Bounded request and connect timeouts
//! - Retry middleware with exponential backoff for resource GETs only
//!
//! The token endpoint is called without retries: a replayed refresh grant
//! against a rotating provider would burn the refresh token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::config::{Config, api};
use crate::error::{ClientError, ClientResult};
use crate::token::TokenResponse;

/// A verbatim upstream response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Outbound capability used by the token manager and the resource proxy.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Authorization-code grant.
    async fn exchange_code(&self, code: &str) -> ClientResult<TokenResponse>;

    /// Refresh-token grant.
    async fn refresh(&self, refresh_token: &str) -> ClientResult<TokenResponse>;

    /// Bearer-authenticated GET of `path` under the API root.
    ///
    /// Non-2xx responses are returned as [`ClientError::Status`].
    async fn get(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<UpstreamResponse>;
}

/// reqwest-backed [`Upstream`].
#[derive(Clone)]
pub struct WhoopClient {
    /// Plain client for the token endpoint.
    token_client: Client,

    /// Resource client with retry middleware.
    api_client: ClientWithMiddleware,

    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    api_root: String,
}

impl WhoopClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let token_client = Self::base_client(config)?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(5))
            .build_with_max_retries(config.max_resource_retries);

        let api_client = ClientBuilder::new(Self::base_client(config)?)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            token_client,
            api_client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: config.token_url.clone(),
            api_root: config.api_root.trim_end_matches('/').to_string(),
        })
    }

    fn base_client(config: &Config) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()
    }

    /// POST a form-encoded grant to the token endpoint.
    async fn post_grant(&self, form: &[(&str, &str)]) -> ClientResult<TokenResponse> {
        let response = self.token_client.post(&self.token_url).form(form).send().await?;
        let response = Self::handle_response(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(ClientError::from)
    }

    /// Map non-2xx statuses to [`ClientError::Status`].
    async fn handle_response(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(ClientError::status(status.as_u16(), text))
    }
}

#[async_trait]
impl Upstream for WhoopClient {
    async fn exchange_code(&self, code: &str) -> ClientResult<TokenResponse> {
        tracing::debug!(token_url = %self.token_url, "Exchanging authorization code");
        self.post_grant(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> ClientResult<TokenResponse> {
        tracing::debug!(token_url = %self.token_url, "Sending refresh grant");
        self.post_grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn get(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<UpstreamResponse> {
        let url = format!("{}{}", self.api_root, path);

        let mut request = self.api_client.get(&url).bearer_auth(access_token);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = Self::handle_response(request.send().await?).await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamResponse { status, content_type, body })
    }
}

impl std::fmt::Debug for WhoopClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhoopClient")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("api_root", &self.api_root)
            .finish()
    }
}
