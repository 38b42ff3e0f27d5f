//! HTTP routes for the proxy.
//!
//! Maps the public paths onto the authorization flow controller and the
//! resource proxy. Failures are reported with generic bodies; upstream error
//! payloads are never relayed.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::auth::AuthorizationFlowController;
use crate::client::UpstreamResponse;
use crate::error::{AuthError, AuthResult};
use crate::proxy::{Resource, ResourceProxy};
use crate::token::TokenLifecycleManager;

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub flow: AuthorizationFlowController,
    pub proxy: ResourceProxy,
    pub tokens: TokenLifecycleManager,
}

/// Query parameters on the provider redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/auth", get(handle_auth))
        .route("/callback", get(handle_callback))
        .route("/recovery", get(handle_recovery))
        .route("/cycle", get(handle_cycles))
        .route("/sleep", get(handle_sleep))
        .route("/body", get(handle_body))
        .route("/basic", get(handle_basic))
        .route("/workout", get(handle_workouts))
        .route("/workout/", get(handle_workouts))
        .route("/workout/{cursor}", get(handle_workouts_page))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "whoop-proxy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<HttpState>>) -> Response {
    match state.tokens.current_token_info().await {
        Ok(info) => Json(serde_json::json!({
            "status": "ready",
            "service": "whoop-proxy",
            "version": env!("CARGO_PKG_VERSION"),
            "authorized": info.is_some(),
            "token": info
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "unavailable" })))
                .into_response()
        }
    }
}

// ─── Authorization ───────────────────────────────────────────────────────────

/// `GET /auth`
///
/// Redirect the user agent to the provider's consent page.
async fn handle_auth(State(state): State<Arc<HttpState>>) -> Response {
    let url = state.flow.begin_authorization().await;
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

/// `GET /callback?code&state`
///
/// Validate `state`, exchange `code`, and answer with the new access token.
async fn handle_callback(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let code = query.code.unwrap_or_default();
    let returned_state = query.state.unwrap_or_default();

    match state.flow.complete_authorization(&code, &returned_state).await {
        Ok(record) => {
            let mut response = record.access_token.into_response();
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        Err(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Authorization callback failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed").into_response()
        }
    }
}

// ─── Resources ───────────────────────────────────────────────────────────────

async fn handle_recovery(State(state): State<Arc<HttpState>>) -> Response {
    relay(Resource::Recovery, state.proxy.get_recovery().await)
}

async fn handle_cycles(State(state): State<Arc<HttpState>>) -> Response {
    relay(Resource::Cycles, state.proxy.get_cycles().await)
}

async fn handle_sleep(State(state): State<Arc<HttpState>>) -> Response {
    relay(Resource::Sleep, state.proxy.get_sleep().await)
}

async fn handle_body(State(state): State<Arc<HttpState>>) -> Response {
    relay(Resource::BodyMeasurement, state.proxy.get_body_measurement().await)
}

async fn handle_basic(State(state): State<Arc<HttpState>>) -> Response {
    relay(Resource::BasicProfile, state.proxy.get_basic_profile().await)
}

/// `GET /workout` and `GET /workout/`
async fn handle_workouts(State(state): State<Arc<HttpState>>) -> Response {
    relay(Resource::Workouts, state.proxy.get_workouts(None).await)
}

/// `GET /workout/{cursor}`
///
/// `cursor` is the `nextToken` from the previous page.
async fn handle_workouts_page(
    State(state): State<Arc<HttpState>>,
    Path(cursor): Path<String>,
) -> Response {
    relay(Resource::Workouts, state.proxy.get_workouts(Some(&cursor)).await)
}

/// Relay a successful upstream body verbatim, or a generic 500.
fn relay(resource: Resource, result: AuthResult<UpstreamResponse>) -> Response {
    match result {
        Ok(upstream) => {
            let content_type = upstream
                .content_type
                .as_deref()
                .and_then(|v| HeaderValue::from_str(v).ok())
                .unwrap_or_else(|| HeaderValue::from_static("application/json"));
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], upstream.body).into_response()
        }
        Err(e) => {
            match &e {
                AuthError::Unauthenticated(_) => {
                    tracing::warn!(
                        resource = resource.name(),
                        error = %e,
                        "No usable access token"
                    );
                }
                _ => {
                    tracing::error!(
                        resource = resource.name(),
                        upstream_status = ?e.upstream_status(),
                        error = %e,
                        "Resource request failed"
                    );
                }
            }
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to fetch {} data", resource.name()))
                .into_response()
        }
    }
}
