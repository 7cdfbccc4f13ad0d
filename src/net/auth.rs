//! Credential exchange with the backend's auth endpoints.
//!
//! These calls are unauthenticated: they run before a token pair exists or
//! while it is being torn down, so they bypass the refresh-and-retry policy.

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

use super::client::{ApiClient, failure, read};
use super::types::{
    Credentials, LOGIN_PATH, LOGOUT_PATH, LoginResponse, REGISTER_PATH, RefreshBody, RegisterBody, Registration, decode,
};
use crate::error::ApiError;

/// Seam between the session controller / server routes and the backend.
#[async_trait::async_trait]
pub trait AuthEndpoints: Send + Sync {
    /// Exchange username/password for a token pair. Any rejection comes back
    /// as `ApiError::Status` with the backend's status and body.
    async fn sign_in(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError>;

    /// Create an account. Field errors come back as `ApiError::Validation`.
    async fn sign_up(&self, registration: &Registration) -> Result<(), ApiError>;

    /// Invalidate a refresh token server-side.
    async fn blacklist(&self, refresh: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct BackendAuth {
    http: reqwest::Client,
    base_url: String,
}

impl BackendAuth {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_owned() }
    }

    /// Share the connection pool and base URL of an existing client.
    #[must_use]
    pub fn from_client(client: &ApiClient) -> Self {
        Self::new(client.http().clone(), &client.config().base_url)
    }

    async fn post<B: serde::Serialize + Sync>(&self, path: &str, body: &B) -> Result<(u16, String), ApiError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(&e))?;
        read(response).await
    }
}

#[async_trait::async_trait]
impl AuthEndpoints for BackendAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        let (status, body) = self.post(LOGIN_PATH, credentials).await?;
        if !(200..300).contains(&status) {
            tracing::info!(status, username = %credentials.username, "sign-in rejected");
            return Err(ApiError::Status { status, body });
        }
        decode(&body)
    }

    async fn sign_up(&self, registration: &Registration) -> Result<(), ApiError> {
        let (status, body) = self.post(REGISTER_PATH, &RegisterBody::from(registration)).await?;
        if (200..300).contains(&status) {
            tracing::info!(username = %registration.username, "account registered");
            return Ok(());
        }
        Err(failure(status, &body))
    }

    async fn blacklist(&self, refresh: &str) -> Result<(), ApiError> {
        let (status, body) = self.post(LOGOUT_PATH, &RefreshBody { refresh }).await?;
        if (200..300).contains(&status) { Ok(()) } else { Err(failure(status, &body)) }
    }
}
