//! HTTP server wiring.
//!
//! Builds the token manager, authorization flow and resource proxy from a
//! [`Config`] and serves them with axum.

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::AuthorizationFlowController;
use crate::client::{Upstream, WhoopClient};
use crate::config::Config;
use crate::proxy::ResourceProxy;
use crate::token::{TokenLifecycleManager, TokenStore};

/// The assembled proxy.
pub struct ProxyServer {
    flow: AuthorizationFlowController,
    proxy: ResourceProxy,
    tokens: TokenLifecycleManager,
}

impl ProxyServer {
    /// Create a server talking to the endpoints in `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built or an endpoint URL is invalid.
    pub fn new(config: &Config, store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let upstream: Arc<dyn Upstream> = Arc::new(WhoopClient::new(config)?);
        Self::with_upstream(config, store, upstream)
    }

    /// Create a server with an injected upstream.
    ///
    /// # Errors
    ///
    /// Returns error if the authorization endpoint URL is invalid.
    pub fn with_upstream(
        config: &Config,
        store: Arc<dyn TokenStore>,
        upstream: Arc<dyn Upstream>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenLifecycleManager::new(store, Arc::clone(&upstream));
        let flow = AuthorizationFlowController::new(config, tokens.clone())?;
        let proxy = ResourceProxy::new(tokens.clone(), upstream);

        Ok(Self { flow, proxy, tokens })
    }

    /// Build the axum router.
    #[must_use]
    pub fn router(self) -> axum::Router {
        routes::create_router(routes::HttpState {
            flow: self.flow,
            proxy: self.proxy,
            tokens: self.tokens,
        })
    }

    /// Serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error on bind or server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        let router = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP server listening on http://{}", addr);

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer").field("flow", &self.flow).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
