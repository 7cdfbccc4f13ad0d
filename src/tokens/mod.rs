//! Token store: where the access/refresh pair lives between requests.
//!
//! SYSTEM CONTEXT
//! ==============
//! The request client and refresh coordinator only ever talk to the
//! [`TokenStore`] trait. Which adapter backs it is decided once, where the
//! store is constructed:
//!
//! - [`SharedCookieJar`] for the client process (one jar for the whole process)
//! - [`RequestCookies`] for the server tier (one jar per incoming request,
//!   changes flow back out as `Set-Cookie` headers)
//!
//! Both persist the tokens as two independent cookies with the same
//! attributes: `HttpOnly`, `SameSite=Strict`, `Path=/`, `Secure` per policy.

pub mod jar;
pub mod request;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_ACCESS_MAX_AGE_SECS, DEFAULT_REFRESH_MAX_AGE_SECS};

pub use jar::SharedCookieJar;
pub use request::RequestCookies;

pub const ACCESS_COOKIE: &str = "access";
pub const REFRESH_COOKIE: &str = "refresh";

// =============================================================================
// TOKEN PAIR
// =============================================================================

/// Opaque bearer credentials. Never decoded client-side.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Cookie max-ages in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_secs: i64,
    pub refresh_secs: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self { access_secs: DEFAULT_ACCESS_MAX_AGE_SECS, refresh_secs: DEFAULT_REFRESH_MAX_AGE_SECS }
    }
}

// =============================================================================
// COOKIE POLICY
// =============================================================================

/// Attributes applied to every token cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self { secure: true, same_site: SameSite::Strict }
    }
}

impl CookiePolicy {
    /// Build a token cookie carrying `value` for `max_age_secs`.
    #[must_use]
    pub fn build(&self, name: &str, value: &str, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((name.to_owned(), value.to_owned()))
            .path("/")
            .http_only(true)
            .same_site(self.same_site)
            .secure(self.secure)
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
    }

    /// Build the cookie that tells a browser to drop `name`.
    #[must_use]
    pub fn removal(&self, name: &str) -> Cookie<'static> {
        Cookie::build((name.to_owned(), String::new()))
            .path("/")
            .http_only(true)
            .same_site(self.same_site)
            .secure(self.secure)
            .max_age(time::Duration::ZERO)
            .build()
    }
}

// =============================================================================
// STORE CONTRACT
// =============================================================================

/// Key/value persistence for the token cookies.
///
/// Implementations must be safe to share between concurrently running
/// requests; no method may block on I/O.
pub trait TokenStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&self, name: &str, value: &str, max_age_secs: i64);

    fn delete(&self, name: &str);

    fn access_token(&self) -> Option<String> {
        self.get(ACCESS_COOKIE)
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_COOKIE)
    }

    /// Persist both tokens. Adapters that can should apply this atomically.
    fn store_pair(&self, pair: &TokenPair, lifetimes: TokenLifetimes) {
        self.set(ACCESS_COOKIE, &pair.access, lifetimes.access_secs);
        self.set(REFRESH_COOKIE, &pair.refresh, lifetimes.refresh_secs);
    }

    /// Drop both tokens.
    fn clear(&self) {
        self.delete(ACCESS_COOKIE);
        self.delete(REFRESH_COOKIE);
    }
}
