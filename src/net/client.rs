//! Authenticated request client.
//!
//! ARCHITECTURE
//! ============
//! Every call goes through [`ApiClient::send`]:
//!
//! 1. attach `Authorization: Bearer <access>` when an access token is stored
//! 2. send
//! 3. on 401, if the request has not been retried: when the store already
//!    holds a newer access token than the one sent, resend with it; otherwise,
//!    if a refresh token exists, refresh through the coordinator, re-authorize
//!    and resend. Either way the request is marked retried
//! 4. a 401 that cannot be retried is `AuthTerminal`
//! 5. anything else comes back untouched
//!
//! The retried marker lives on the [`ApiRequest`] itself, so a replayed
//! request that is rejected again can never loop back into a refresh.
//!
//! Typed helpers (`get_json`, `send_json`, `send_empty`) sit on top and turn
//! statuses into `ApiError` variants.

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use super::build_http;
use super::refresh::RefreshCoordinator;
use super::types::decode;
use crate::config::ApiConfig;
use crate::error::{ApiError, FieldErrors, RefreshError};
use crate::tokens::TokenStore;

// =============================================================================
// REQUEST DESCRIPTOR
// =============================================================================

/// An outbound call that can be replayed once after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
    retried: bool,
}

impl ApiRequest {
    /// `path` is relative to the API base URL and starts with `/`.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    #[must_use]
    pub fn query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    fn authorize(&mut self, access: &str) -> Result<(), ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {access}"))
            .map_err(|_| ApiError::Schema("access token is not a valid header value".into()))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ApiConfig>,
    store: Arc<dyn TokenStore>,
    refresher: RefreshCoordinator,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Build a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let http = build_http(config.timeouts)?;
        Ok(Self::with_http(http, config, store))
    }

    /// Build a client over an existing connection pool, with its own refresh
    /// coordinator.
    #[must_use]
    pub fn with_http(http: reqwest::Client, config: &ApiConfig, store: Arc<dyn TokenStore>) -> Self {
        let refresher = RefreshCoordinator::from_config(http.clone(), config);
        Self::with_refresher(http, Arc::new(config.clone()), store, refresher)
    }

    /// Build a client that joins refreshes through an existing coordinator.
    #[must_use]
    pub fn with_refresher(
        http: reqwest::Client,
        config: Arc<ApiConfig>,
        store: Arc<dyn TokenStore>,
        refresher: RefreshCoordinator,
    ) -> Self {
        Self { http, config, store, refresher }
    }

    /// Same backend, pool and refresh coordinator over a different token
    /// store.
    #[must_use]
    pub fn scoped(&self, store: Arc<dyn TokenStore>) -> Self {
        Self::with_refresher(self.http.clone(), Arc::clone(&self.config), store, self.refresher.clone())
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Convenience form of [`ApiClient::send`].
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        headers: Option<HeaderMap>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = ApiRequest::new(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        self.send(request).await
    }

    /// Send with bearer auth and the single refresh-and-retry on 401.
    ///
    /// # Errors
    ///
    /// - `Transport` if the backend cannot be reached or times out
    /// - `AuthTerminal` on a 401 that cannot be recovered by refreshing
    pub async fn send(&self, mut request: ApiRequest) -> Result<reqwest::Response, ApiError> {
        let sent_with = self.store.access_token();
        if let Some(access) = &sent_with {
            request.authorize(access)?;
        }

        loop {
            let response = self.dispatch(&request).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if request.retried {
                tracing::info!(method = %request.method, path = %request.path, "request rejected after refresh");
                return Err(ApiError::AuthTerminal { refresh: None });
            }

            // A refresh finished while this request was in flight.
            if let Some(current) = self.store.access_token()
                && sent_with.as_deref() != Some(current.as_str())
            {
                tracing::debug!(method = %request.method, path = %request.path, "retrying with already refreshed token");
                request.retried = true;
                request.authorize(&current)?;
                continue;
            }

            if self.store.refresh_token().is_none() {
                tracing::debug!(method = %request.method, path = %request.path, "401 without refresh token");
                return Err(ApiError::AuthTerminal { refresh: Some(RefreshError::MissingToken) });
            }

            request.retried = true;
            match self.refresher.refresh(&self.store).await {
                Ok(access) => request.authorize(&access)?,
                Err(e) => {
                    tracing::warn!(error = %e, path = %request.path, "token refresh failed");
                    return Err(ApiError::AuthTerminal { refresh: Some(e) });
                }
            }
        }
    }

    /// `GET path` and decode the body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// Send and decode a 2xx body into `T`.
    ///
    /// # Errors
    ///
    /// Everything [`ApiClient::send`] returns, plus `Schema` for a body that
    /// does not fit `T`, `Validation` for 4xx field errors and `Status` for
    /// other failures.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let (_, value) = self.send_json_with_status(request).await?;
        Ok(value)
    }

    /// [`ApiClient::send_json`], keeping the success status (`200`, `201`, ...).
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn send_json_with_status<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<(u16, T), ApiError> {
        let (status, body) = read(self.send(request).await?).await?;
        let value = interpret(status, &body)?;
        Ok((status, value))
    }

    /// Send and require a 2xx status, ignoring the body.
    ///
    /// # Errors
    ///
    /// As [`ApiClient::send_json`], minus `Schema`.
    pub async fn send_empty(&self, request: ApiRequest) -> Result<(), ApiError> {
        let (status, body) = read(self.send(request).await?).await?;
        if is_success(status) { Ok(()) } else { Err(failure(status, &body)) }
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, method = %request.method, path = %request.path, "backend request failed");
            ApiError::transport(&e)
        })
    }
}

// =============================================================================
// STATUS ROUTING
// =============================================================================

pub(crate) async fn read(response: reqwest::Response) -> Result<(u16, String), ApiError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::transport(&e))?;
    Ok((status, body))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub(crate) fn interpret<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    if is_success(status) { decode(body) } else { Err(failure(status, body)) }
}

/// Classify a non-success response. A 4xx body that maps fields to messages
/// is a validation failure; a lone `detail` message is not.
pub(crate) fn failure(status: u16, body: &str) -> ApiError {
    if (400..500).contains(&status) {
        if let Some(fields) = FieldErrors::parse(body) {
            let detail_only = fields.len() == 1 && fields.detail().is_some();
            if !detail_only {
                return ApiError::Validation(fields);
            }
        }
    }
    ApiError::Status { status, body: body.to_owned() }
}
