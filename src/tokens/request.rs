//! Request-scoped cookie adapter for the server tier.
//!
//! SYSTEM CONTEXT
//! ==============
//! Built from the incoming request's `Cookie` header. Writes go into the
//! `CookieJar` delta, and the handler returns [`RequestCookies::jar`] as a
//! response part so the browser receives matching `Set-Cookie` headers. A
//! refresh performed while serving the request therefore updates the browser
//! in the same response.

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar};

use super::{CookiePolicy, TokenStore};

#[derive(Clone)]
pub struct RequestCookies {
    jar: Arc<Mutex<CookieJar>>,
    policy: CookiePolicy,
}

impl std::fmt::Debug for RequestCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCookies")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RequestCookies {
    #[must_use]
    pub fn new(jar: CookieJar, policy: CookiePolicy) -> Self {
        Self { jar: Arc::new(Mutex::new(jar)), policy }
    }

    #[must_use]
    pub fn from_headers(headers: &HeaderMap, policy: CookiePolicy) -> Self {
        Self::new(CookieJar::from_headers(headers), policy)
    }

    /// Snapshot of the jar, including pending `Set-Cookie` changes.
    #[must_use]
    pub fn jar(&self) -> CookieJar {
        self.jar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(CookieJar) -> CookieJar) {
        let mut guard = self.jar.lock().unwrap_or_else(PoisonError::into_inner);
        let current = guard.clone();
        *guard = f(current);
    }
}

impl TokenStore for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.jar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|c| c.value().to_owned())
    }

    fn set(&self, name: &str, value: &str, max_age_secs: i64) {
        if max_age_secs <= 0 {
            self.delete(name);
            return;
        }
        let cookie = self.policy.build(name, value, max_age_secs);
        self.update(|jar| jar.add(cookie));
    }

    fn delete(&self, name: &str) {
        let removal: Cookie<'static> = self.policy.removal(name);
        self.update(|jar| jar.remove(removal));
    }
}

/// Extract the token cookies of the current request. The cookie policy comes
/// from the application state.
impl<S> FromRequestParts<S> for RequestCookies
where
    CookiePolicy: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, CookiePolicy::from_ref(state)))
    }
}
