//! Router assembly for the portal's server tier.
//!
//! SYSTEM CONTEXT
//! ==============
//! The browser pages never see tokens. They call these routes with the
//! `access`/`refresh` cookies attached; each handler builds a request-scoped
//! [`ApiClient`] over those cookies, calls the backend, and returns whatever
//! cookie changes happened along the way (sign-in, refresh, sign-out) as
//! `Set-Cookie` headers on its response.

pub mod auth;
pub mod resources;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::net::auth::{AuthEndpoints, BackendAuth};
use crate::net::build_http;
use crate::net::client::ApiClient;
use crate::net::refresh::RefreshCoordinator;
use crate::tokens::{CookiePolicy, RequestCookies, TokenStore};

// =============================================================================
// STATE
// =============================================================================

/// Shared across handlers. Holds one connection pool and one refresh
/// coordinator; token stores are per request. Concurrent requests carrying
/// the same refresh cookie therefore share a single refresh call.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub http: reqwest::Client,
    pub auth: Arc<dyn AuthEndpoints>,
    pub refresher: RefreshCoordinator,
}

impl AppState {
    #[must_use]
    pub fn new(config: ApiConfig, http: reqwest::Client, auth: Arc<dyn AuthEndpoints>) -> Self {
        let refresher = RefreshCoordinator::from_config(http.clone(), &config);
        Self { config: Arc::new(config), http, auth, refresher }
    }

    /// State talking to the configured backend over a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the HTTP client cannot be constructed.
    pub fn from_config(config: ApiConfig) -> Result<Self, ApiError> {
        let http = build_http(config.timeouts)?;
        let auth = Arc::new(BackendAuth::new(http.clone(), &config.base_url));
        Ok(Self::new(config, http, auth))
    }

    /// Client bound to the cookies of the current request.
    #[must_use]
    pub fn client_for(&self, cookies: &RequestCookies) -> ApiClient {
        ApiClient::with_refresher(
            self.http.clone(),
            Arc::clone(&self.config),
            Arc::new(cookies.clone()),
            self.refresher.clone(),
        )
    }
}

impl FromRef<AppState> for CookiePolicy {
    fn from_ref(state: &AppState) -> Self {
        state.config.cookies
    }
}

// =============================================================================
// ROUTER
// =============================================================================

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/sign-up", post(auth::sign_up))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/reports/{report}/", get(resources::report))
        .route("/api/{resource}/", get(resources::list).post(resources::create))
        .route(
            "/api/{resource}/{id}/",
            get(resources::retrieve)
                .put(resources::update)
                .patch(resources::patch)
                .delete(resources::destroy),
        )
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Translate an access-layer failure into the portal's response. Cookie
/// changes made while serving the request are always carried along; a terminal
/// auth failure also expires both token cookies.
pub(crate) fn error_response(err: &ApiError, cookies: &RequestCookies) -> Response {
    match err {
        ApiError::AuthTerminal { refresh } => {
            tracing::info!(cause = ?refresh, "session expired, clearing token cookies");
            cookies.clear();
            let body = Json(json!({ "error": "authentication required" }));
            (StatusCode::UNAUTHORIZED, cookies.jar(), body).into_response()
        }
        ApiError::Validation(fields) => {
            (StatusCode::BAD_REQUEST, cookies.jar(), Json(json!({ "errors": fields }))).into_response()
        }
        ApiError::Status { status, body } => {
            let code = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
            match serde_json::from_str::<serde_json::Value>(body) {
                Ok(value) => (code, cookies.jar(), Json(value)).into_response(),
                Err(_) => (code, cookies.jar(), body.clone()).into_response(),
            }
        }
        ApiError::Transport(e) => {
            tracing::error!(error = %e, "backend unreachable");
            let body = Json(json!({ "error": "backend unavailable" }));
            (StatusCode::BAD_GATEWAY, cookies.jar(), body).into_response()
        }
        ApiError::Schema(e) => {
            tracing::error!(error = %e, "backend response did not match schema");
            let body = Json(json!({ "error": "unexpected backend response" }));
            (StatusCode::BAD_GATEWAY, cookies.jar(), body).into_response()
        }
        ApiError::ConfigParse(_) | ApiError::HttpClientBuild(_) => {
            tracing::error!(error = %err, "portal misconfigured");
            (StatusCode::INTERNAL_SERVER_ERROR, cookies.jar(), Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}
