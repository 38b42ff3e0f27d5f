//! WHOOP OAuth2 Proxy
//!
//! Performs the OAuth 2.0 authorization-code flow against WHOOP, persists the
//! resulting token pair, keeps the access token valid by refreshing it on
//! demand, and forwards a fixed set of authenticated developer API calls.
//!
//! # Features
//!
//! - **Single-flight refresh**: concurrent callers on an expired token share one
//!   refresh grant, so a rotating refresh token is never spent twice
//! - **Persistent**: token snapshots in an append-only JSON-lines log
//! - **Pass-through**: upstream bodies are relayed verbatim
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use whoop_proxy::{config::Config, server::ProxyServer, token::FileTokenStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = FileTokenStore::open(&config.store_path).await?;
//!     ProxyServer::new(&config, Arc::new(store))?.run_http(4000).await
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod proxy;
pub mod server;
pub mod token;

pub use auth::{AuthState, AuthorizationFlowController};
pub use client::{Upstream, UpstreamResponse, WhoopClient};
pub use config::Config;
pub use error::{AuthError, ClientError, StoreError};
pub use proxy::{Resource, ResourceProxy};
pub use token::{TokenLifecycleManager, TokenRecord, TokenStore};
