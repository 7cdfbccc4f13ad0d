//! Process-wide cookie jar for code running in the client process.
//!
//! DESIGN
//! ======
//! Clones share one map behind `Arc<RwLock<_>>`, so every request client and
//! the refresh coordinator in a process see the same tokens. Writes land
//! before the call returns. Expiry is tracked with `Instant` and enforced on
//! read; stale entries are swept on the next write.

#[cfg(test)]
#[path = "jar_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use axum_extra::extract::cookie::Cookie;

use super::{ACCESS_COOKIE, CookiePolicy, REFRESH_COOKIE, TokenLifetimes, TokenPair, TokenStore};

struct StoredCookie {
    cookie: Cookie<'static>,
    expires_at: Instant,
}

impl StoredCookie {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type CookieMap = HashMap<String, StoredCookie>;

#[derive(Clone, Default)]
pub struct SharedCookieJar {
    inner: Arc<RwLock<CookieMap>>,
    policy: CookiePolicy,
}

impl std::fmt::Debug for SharedCookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.cookies().iter().map(|c| c.name().to_owned()).collect();
        f.debug_struct("SharedCookieJar")
            .field("cookies", &names)
            .field("policy", &self.policy)
            .finish()
    }
}

impl SharedCookieJar {
    #[must_use]
    pub fn new(policy: CookiePolicy) -> Self {
        Self { inner: Arc::default(), policy }
    }

    #[must_use]
    pub fn policy(&self) -> CookiePolicy {
        self.policy
    }

    /// Live cookies with their attributes.
    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        let now = Instant::now();
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut cookies: Vec<Cookie<'static>> = map
            .values()
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.cookie.clone())
            .collect();
        cookies.sort_by(|a, b| a.name().cmp(b.name()));
        cookies
    }

    /// Render the live cookies as a `Cookie` request header value.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies();
        if cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = cookies
            .iter()
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect();
        Some(pairs.join("; "))
    }

    fn write_entry(&self, map: &mut CookieMap, name: &str, value: &str, max_age_secs: i64) {
        if max_age_secs <= 0 {
            map.remove(name);
            return;
        }
        let ttl = Duration::from_secs(max_age_secs.unsigned_abs());
        let stored = StoredCookie { cookie: self.policy.build(name, value, max_age_secs), expires_at: Instant::now() + ttl };
        map.insert(name.to_owned(), stored);
    }
}

fn sweep(map: &mut CookieMap) {
    let now = Instant::now();
    map.retain(|_, stored| stored.is_live(now));
}

impl TokenStore for SharedCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name)
            .filter(|stored| stored.is_live(Instant::now()))
            .map(|stored| stored.cookie.value().to_owned())
    }

    fn set(&self, name: &str, value: &str, max_age_secs: i64) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        sweep(&mut map);
        self.write_entry(&mut map, name, value, max_age_secs);
    }

    fn delete(&self, name: &str) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(name);
    }

    fn store_pair(&self, pair: &TokenPair, lifetimes: TokenLifetimes) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        sweep(&mut map);
        self.write_entry(&mut map, ACCESS_COOKIE, &pair.access, lifetimes.access_secs);
        self.write_entry(&mut map, REFRESH_COOKIE, &pair.refresh, lifetimes.refresh_secs);
    }

    fn clear(&self) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(ACCESS_COOKIE);
        map.remove(REFRESH_COOKIE);
    }
}
