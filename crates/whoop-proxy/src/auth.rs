//! Authorization-code flow: CSRF nonce handling and provider redirect.

use std::sync::Arc;

use tokio::sync::Mutex;
use url::Url;

use crate::config::Config;
use crate::error::{AuthError, AuthResult};
use crate::token::{TokenLifecycleManager, TokenRecord};

/// The single outstanding CSRF nonce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Empty,
    Issued(String),
}

impl AuthState {
    /// Consume the nonce, leaving `Empty` behind.
    fn take(&mut self) -> Option<String> {
        match std::mem::take(self) {
            Self::Issued(nonce) => Some(nonce),
            Self::Empty => None,
        }
    }
}

/// Drives `/auth` and `/callback`.
#[derive(Clone)]
pub struct AuthorizationFlowController {
    authorize_url: Url,
    client_id: String,
    redirect_uri: String,
    scope: String,
    state: Arc<Mutex<AuthState>>,
    tokens: TokenLifecycleManager,
}

impl AuthorizationFlowController {
    /// # Errors
    ///
    /// Returns error if the configured authorization endpoint is not a valid URL.
    pub fn new(config: &Config, tokens: TokenLifecycleManager) -> Result<Self, url::ParseError> {
        Ok(Self {
            authorize_url: Url::parse(&config.authorize_url)?,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope(),
            state: Arc::new(Mutex::new(AuthState::Empty)),
            tokens,
        })
    }

    /// UUID v4 nonce (122 random bits), 32 lowercase hex characters.
    fn generate_nonce() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Issue a fresh nonce and build the provider authorization URL.
    ///
    /// Any unconsumed nonce from an earlier call is superseded.
    pub async fn begin_authorization(&self) -> String {
        let nonce = Self::generate_nonce();

        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scope)
            .append_pair("state", &nonce);

        let previous = std::mem::replace(&mut *self.state.lock().await, AuthState::Issued(nonce));
        if previous != AuthState::Empty {
            tracing::debug!("Superseding unconsumed authorization state");
        }

        tracing::info!("Issued authorization redirect");
        url.into()
    }

    /// Validate the returned `state` and exchange `code` for a token record.
    ///
    /// The nonce is consumed by every call, whatever the outcome.
    pub async fn complete_authorization(
        &self,
        code: &str,
        returned_state: &str,
    ) -> AuthResult<TokenRecord> {
        let expected = self.state.lock().await.take();

        if expected.as_deref() != Some(returned_state) {
            tracing::warn!(
                outstanding = expected.is_some(),
                "Rejected callback with invalid state"
            );
            return Err(AuthError::InvalidState);
        }

        if code.is_empty() {
            return Err(AuthError::exchange_failed("missing authorization code"));
        }

        self.tokens.authorize(code).await
    }

    /// Current nonce state, for diagnostics and tests.
    pub async fn auth_state(&self) -> AuthState {
        self.state.lock().await.clone()
    }
}

impl std::fmt::Debug for AuthorizationFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationFlowController")
            .field("authorize_url", &self.authorize_url.as_str())
            .field("client_id", &self.client_id)
            .finish()
    }
}
