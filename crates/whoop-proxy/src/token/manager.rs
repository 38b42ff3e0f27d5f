//! Token lifecycle: authorization, expiry checks and single-flight refresh.
//!
//! All reads and writes of the current record happen under one mutex. A
//! refresh runs outside that mutex as a shared future tagged with the record
//! id; every caller that observes the same expired record awaits that one
//! future instead of sending its own refresh grant.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::TokenStore;
use super::types::{TokenInfo, TokenRecord};
use crate::client::Upstream;
use crate::error::{AuthError, AuthResult};

type RefreshFuture = Shared<BoxFuture<'static, AuthResult<TokenRecord>>>;

/// A refresh in flight for one record identity.
struct InFlight {
    record_id: Uuid,
    future: RefreshFuture,
}

#[derive(Default)]
struct TokenState {
    current: Option<TokenRecord>,
    /// Whether `current` has been loaded from the store.
    loaded: bool,
    in_flight: Option<InFlight>,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    upstream: Arc<dyn Upstream>,
    state: Mutex<TokenState>,
}

/// Owns the current token record and keeps its access token valid.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<Inner>,
}

impl TokenLifecycleManager {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            inner: Arc::new(Inner { store, upstream, state: Mutex::new(TokenState::default()) }),
        }
    }

    /// Exchange an authorization code and persist the resulting record.
    ///
    /// Nothing is persisted when the exchange fails.
    pub async fn authorize(&self, code: &str) -> AuthResult<TokenRecord> {
        let response = self.inner.upstream.exchange_code(code).await.map_err(|e| {
            tracing::warn!(
                timeout = e.is_timeout(),
                error = %e,
                "Authorization code exchange failed"
            );
            AuthError::exchange_failed(e.to_string())
        })?;

        let record = TokenRecord::issue(response, Utc::now());

        let mut state = self.inner.state.lock().await;
        self.inner.store.create(&record).await?;
        state.current = Some(record.clone());
        state.loaded = true;

        tracing::info!(
            record_id = %record.id,
            expires_in = record.expires_in,
            has_refresh_token = record.refresh_token().is_some(),
            "Stored new token record"
        );
        Ok(record)
    }

    /// Return a usable access token, refreshing the current record if it has expired.
    ///
    /// Concurrent callers that see the same expired record share one refresh
    /// and all receive its outcome.
    pub async fn get_valid_access_token(&self) -> AuthResult<String> {
        let refresh = {
            let mut state = self.inner.state.lock().await;
            let record = match self.inner.load_current(&mut state).await? {
                Some(record) => record,
                None => return Err(AuthError::NoToken),
            };

            if !record.is_expired(Utc::now()) {
                return Ok(record.access_token);
            }

            let joinable = state
                .in_flight
                .as_ref()
                .filter(|flight| flight.record_id == record.id)
                .map(|flight| flight.future.clone());

            if let Some(future) = joinable {
                tracing::debug!(record_id = %record.id, "Joining in-flight refresh");
                future
            } else {
                let Some(refresh_token) = record.refresh_token().map(str::to_string) else {
                    tracing::info!(record_id = %record.id, "Token expired and cannot be refreshed");
                    return Err(AuthError::NoToken);
                };
                let record_id = record.id;
                let future = Inner::spawn_refresh(&self.inner, record, refresh_token);
                state.in_flight = Some(InFlight { record_id, future: future.clone() });
                future
            }
        };

        refresh.await.map(|record| record.access_token)
    }

    /// Expiry status of the current record, if any.
    pub async fn current_token_info(&self) -> AuthResult<Option<TokenInfo>> {
        let mut state = self.inner.state.lock().await;
        let record = self.inner.load_current(&mut state).await?;
        Ok(record.map(|r| TokenInfo::from_record(&r, Utc::now())))
    }
}

impl Inner {
    /// Current record, loading it from the store on first use.
    async fn load_current(&self, state: &mut TokenState) -> AuthResult<Option<TokenRecord>> {
        if !state.loaded {
            state.current = self.store.latest().await?;
            state.loaded = true;
            if let Some(record) = &state.current {
                tracing::info!(record_id = %record.id, "Loaded token record from store");
            }
        }
        Ok(state.current.clone())
    }

    /// Start the refresh on its own task so that a cancelled request cannot
    /// abandon a grant the provider may already have honoured.
    fn spawn_refresh(
        this: &Arc<Self>,
        record: TokenRecord,
        refresh_token: String,
    ) -> RefreshFuture {
        let handle = tokio::spawn(Self::refresh(Arc::clone(this), record, refresh_token));
        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(AuthError::refresh_failed(format!("refresh task: {e}"))))
        }
        .boxed()
        .shared()
    }

    async fn refresh(
        self: Arc<Self>,
        record: TokenRecord,
        refresh_token: String,
    ) -> AuthResult<TokenRecord> {
        tracing::info!(record_id = %record.id, "Access token expired, refreshing");
        let result = self.upstream.refresh(&refresh_token).await;

        let mut state = self.state.lock().await;
        if state.in_flight.as_ref().is_some_and(|f| f.record_id == record.id) {
            state.in_flight = None;
        }

        // The stale record stays in place on failure so a later call retries.
        let response = result.map_err(|e| {
            tracing::warn!(
                record_id = %record.id,
                timeout = e.is_timeout(),
                error = %e,
                "Token refresh failed"
            );
            AuthError::refresh_failed(e.to_string())
        })?;
        let updated = record.refreshed(response, Utc::now());

        if state.current.as_ref().is_some_and(|c| c.id == record.id) {
            // Publish in memory even if persisting fails: the provider may
            // have rotated the refresh token and the old one is now dead.
            if let Err(e) = self.store.update(&updated).await {
                tracing::error!(
                    record_id = %updated.id,
                    error = %e,
                    "Failed to persist refreshed token"
                );
            }
            state.current = Some(updated.clone());
            tracing::info!(
                record_id = %updated.id,
                expires_in = updated.expires_in,
                "Refreshed access token"
            );
        } else {
            tracing::debug!(
                record_id = %record.id,
                "Record superseded during refresh; result not stored"
            );
        }

        Ok(updated)
    }
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager").finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::client::UpstreamResponse;
    use crate::error::{ClientError, ClientResult};
    use crate::token::{MemoryTokenStore, TokenResponse};

    #[derive(Default)]
    struct CountingUpstream {
        exchanges: AtomicUsize,
        refreshes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Upstream for CountingUpstream {
        async fn exchange_code(&self, code: &str) -> ClientResult<TokenResponse> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ClientError::status(400, "invalid_grant"));
            }
            Ok(TokenResponse {
                access_token: format!("AT-{code}"),
                refresh_token: Some("RT1".into()),
                expires_in: 3600,
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> ClientResult<TokenResponse> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ClientError::status(401, "invalid_grant"));
            }
            Ok(TokenResponse { access_token: "AT2".into(), refresh_token: None, expires_in: 3600 })
        }

        async fn get(
            &self,
            _path: &str,
            _access_token: &str,
            _query: &[(&str, &str)],
        ) -> ClientResult<UpstreamResponse> {
            unreachable!("manager never issues resource calls")
        }
    }

    fn expired_record(refresh_token: Option<&str>) -> TokenRecord {
        TokenRecord {
            id: Uuid::new_v4(),
            access_token: "AT1".into(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in: 3600,
            issued_at: Utc::now() - Duration::seconds(7200),
        }
    }

    fn manager(store: MemoryTokenStore, upstream: Arc<CountingUpstream>) -> TokenLifecycleManager {
        TokenLifecycleManager::new(Arc::new(store), upstream)
    }

    #[tokio::test]
    async fn test_no_record_is_no_token() {
        let upstream = Arc::new(CountingUpstream::default());
        let manager = manager(MemoryTokenStore::new(), Arc::clone(&upstream));

        assert_eq!(manager.get_valid_access_token().await, Err(AuthError::NoToken));
        assert_eq!(upstream.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authorize_then_get_uses_cache() {
        let upstream = Arc::new(CountingUpstream::default());
        let store = MemoryTokenStore::new();
        let manager = manager(store.clone(), Arc::clone(&upstream));

        let record = manager.authorize("codeX").await.unwrap();
        assert_eq!(record.access_token, "AT-codeX");
        assert_eq!(store.len().await, 1);

        assert_eq!(manager.get_valid_access_token().await.unwrap(), "AT-codeX");
        assert_eq!(upstream.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_exchange_persists_nothing() {
        let upstream = Arc::new(CountingUpstream { fail: true, ..Default::default() });
        let store = MemoryTokenStore::new();
        let manager = manager(store.clone(), upstream);

        let result = manager.authorize("codeX").await;
        assert!(matches!(result, Err(AuthError::ExchangeFailed(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_skips_network() {
        let upstream = Arc::new(CountingUpstream::default());
        let store = MemoryTokenStore::with_record(expired_record(None));
        let manager = manager(store, Arc::clone(&upstream));

        assert_eq!(manager.get_valid_access_token().await, Err(AuthError::NoToken));
        assert_eq!(upstream.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_record() {
        let upstream = Arc::new(CountingUpstream { fail: true, ..Default::default() });
        let stale = expired_record(Some("RT1"));
        let store = MemoryTokenStore::with_record(stale.clone());
        let manager = manager(store.clone(), Arc::clone(&upstream));

        assert!(matches!(manager.get_valid_access_token().await, Err(AuthError::RefreshFailed(_))));
        assert_eq!(store.latest().await.unwrap(), Some(stale));

        // A later call retries rather than failing permanently.
        assert!(manager.get_valid_access_token().await.is_err());
        assert_eq!(upstream.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_token_info_reports_expiry() {
        let upstream = Arc::new(CountingUpstream::default());
        let manager = manager(MemoryTokenStore::with_record(expired_record(Some("RT1"))), upstream);

        let info = manager.current_token_info().await.unwrap().unwrap();
        assert!(info.is_expired);
        assert!(info.can_refresh);
    }
}
