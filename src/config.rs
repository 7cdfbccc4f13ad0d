//! Portal configuration parsed from environment variables.
//!
//! `main` loads a `.env` file first (if present), so every value here can come
//! from either the process environment or that file.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use crate::error::ApiError;
use crate::tokens::{CookiePolicy, TokenLifetimes};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ACCESS_MAX_AGE_SECS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Everything the access layer needs to talk to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Backend API root without trailing slash, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    pub timeouts: Timeouts,
    pub lifetimes: TokenLifetimes,
    /// Whether the refresh endpoint hands out a new refresh token on each use.
    pub rotate_refresh_tokens: bool,
    pub cookies: CookiePolicy,
}

impl ApiConfig {
    /// Config pointing at `base_url` with every other value at its default.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeouts: Timeouts::default(),
            lifetimes: TokenLifetimes::default(),
            rotate_refresh_tokens: true,
            cookies: CookiePolicy::default(),
        }
    }

    /// Build typed API config from environment variables.
    ///
    /// Optional:
    /// - `API_BASE_URL`: default `http://localhost:8000/api`
    /// - `API_REQUEST_TIMEOUT_SECS`: default 30
    /// - `API_CONNECT_TIMEOUT_SECS`: default 10
    /// - `ACCESS_TOKEN_MAX_AGE_SECS`: default 900
    /// - `REFRESH_TOKEN_MAX_AGE_SECS`: default 2592000
    /// - `ROTATE_REFRESH_TOKENS`: default true
    /// - `COOKIE_SECURE`: default inferred from the `PUBLIC_URL` scheme
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` if `API_BASE_URL` is not an http(s) URL.
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = env_string("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned());
        let base_url = parse_base_url(&base_url)?;

        let timeouts = Timeouts {
            request_secs: env_parse("API_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("API_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let lifetimes = TokenLifetimes {
            access_secs: env_parse("ACCESS_TOKEN_MAX_AGE_SECS", DEFAULT_ACCESS_MAX_AGE_SECS),
            refresh_secs: env_parse("REFRESH_TOKEN_MAX_AGE_SECS", DEFAULT_REFRESH_MAX_AGE_SECS),
        };
        let rotate_refresh_tokens = env_bool("ROTATE_REFRESH_TOKENS").unwrap_or(true);
        let cookies = CookiePolicy { secure: cookie_secure(), ..CookiePolicy::default() };

        Ok(Self { base_url, timeouts, lifetimes, rotate_refresh_tokens, cookies })
    }
}

/// Settings for the portal's own HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub public_url: String,
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self { port: env_parse("PORT", DEFAULT_PORT), public_url: public_url() }
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().to_owned()),
        _ => None,
    }
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    env_string(key).and_then(|raw| parse_bool(&raw))
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_string(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn public_url() -> String {
    env_string("PUBLIC_URL").unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_owned())
}

/// `COOKIE_SECURE` wins when set; otherwise cookies are secure when the portal
/// is served over https.
pub(crate) fn cookie_secure() -> bool {
    if let Some(value) = env_bool("COOKIE_SECURE") {
        return value;
    }
    public_url().starts_with("https://")
}

pub(crate) fn parse_base_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ApiError::ConfigParse(format!("API_BASE_URL must be an http(s) URL, got '{raw}'")));
    }
    Ok(trimmed.to_owned())
}
