//! Networking: the authenticated access layer to the backend REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `client` wraps outbound calls with bearer auth and the refresh-and-retry
//! policy, `refresh` deduplicates concurrent refreshes, `auth` exchanges
//! credentials for tokens, and `types` defines the wire schema.

pub mod auth;
pub mod client;
pub mod refresh;
pub mod types;

use std::time::Duration;

use crate::config::Timeouts;
use crate::error::ApiError;

/// Build the shared HTTP client with bounded request and connect timeouts.
///
/// # Errors
///
/// Returns `HttpClientBuild` if the TLS backend fails to initialize.
pub fn build_http(timeouts: Timeouts) -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.request_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .build()
        .map_err(|e| ApiError::HttpClientBuild(e.to_string()))
}
