//! Authenticated pass-through to the WHOOP developer API.

use std::sync::Arc;

use crate::client::{Upstream, UpstreamResponse};
use crate::error::{AuthError, AuthResult};
use crate::token::TokenLifecycleManager;

/// The fixed set of upstream resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Recovery,
    Cycles,
    Sleep,
    BodyMeasurement,
    BasicProfile,
    Workouts,
}

impl Resource {
    /// Path under the versioned API root.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Recovery => "/recovery",
            Self::Cycles => "/cycles",
            Self::Sleep => "/activity/sleep",
            Self::BodyMeasurement => "/user/measurement/body",
            Self::BasicProfile => "/user/profile/basic",
            Self::Workouts => "/activity/workout",
        }
    }

    /// Short name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Cycles => "cycle",
            Self::Sleep => "sleep",
            Self::BodyMeasurement => "body measurement",
            Self::BasicProfile => "profile",
            Self::Workouts => "workout",
        }
    }
}

/// Forwards one bearer-authenticated GET per call.
#[derive(Clone)]
pub struct ResourceProxy {
    tokens: TokenLifecycleManager,
    upstream: Arc<dyn Upstream>,
}

impl ResourceProxy {
    #[must_use]
    pub fn new(tokens: TokenLifecycleManager, upstream: Arc<dyn Upstream>) -> Self {
        Self { tokens, upstream }
    }

    pub async fn get_recovery(&self) -> AuthResult<UpstreamResponse> {
        self.fetch(Resource::Recovery, &[]).await
    }

    pub async fn get_cycles(&self) -> AuthResult<UpstreamResponse> {
        self.fetch(Resource::Cycles, &[]).await
    }

    pub async fn get_sleep(&self) -> AuthResult<UpstreamResponse> {
        self.fetch(Resource::Sleep, &[]).await
    }

    pub async fn get_body_measurement(&self) -> AuthResult<UpstreamResponse> {
        self.fetch(Resource::BodyMeasurement, &[]).await
    }

    pub async fn get_basic_profile(&self) -> AuthResult<UpstreamResponse> {
        self.fetch(Resource::BasicProfile, &[]).await
    }

    /// One page of workouts. `nextToken` is sent only when a cursor is given.
    pub async fn get_workouts(&self, cursor: Option<&str>) -> AuthResult<UpstreamResponse> {
        match cursor.filter(|c| !c.is_empty()) {
            Some(cursor) => self.fetch(Resource::Workouts, &[("nextToken", cursor)]).await,
            None => self.fetch(Resource::Workouts, &[]).await,
        }
    }

    /// Obtain a token, then issue exactly one upstream GET.
    pub async fn fetch(
        &self,
        resource: Resource,
        query: &[(&str, &str)],
    ) -> AuthResult<UpstreamResponse> {
        let access_token = self
            .tokens
            .get_valid_access_token()
            .await
            .map_err(|e| AuthError::Unauthenticated(Box::new(e)))?;

        tracing::debug!(resource = resource.name(), path = resource.path(), "Forwarding request");

        self.upstream.get(resource.path(), &access_token, query).await.map_err(|e| {
            tracing::warn!(
                resource = resource.name(),
                timeout = e.is_timeout(),
                error = %e,
                "Upstream request failed"
            );
            AuthError::upstream(&e)
        })
    }
}

impl std::fmt::Debug for ResourceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProxy").finish()
    }
}
