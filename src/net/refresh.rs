//! Refresh coordinator: single-flight access-token refresh.
//!
//! ARCHITECTURE
//! ============
//! Flights are keyed by the refresh token being exchanged. The first caller
//! presenting a given refresh token starts the call and parks its outcome in
//! the map as a `Shared` future; every caller presenting the same token while
//! it is pending clones that future and awaits it. When the call settles, the
//! future removes its own entry, so the next 401 after that starts a fresh
//! refresh.
//!
//! Each caller writes the outcome into its own token store. The starting
//! caller's store is written inside the flight, before any waiter wakes, so a
//! request that reads the store afterwards already sees the new access token.
//! A store whose refresh token no longer matches the exchanged one has moved
//! on (rotated, cleared, or signed in again) and is left alone.
//!
//! One coordinator can serve every store in the process. Two sessions only
//! share a flight when they present the same refresh token, which means they
//! are the same session.
//!
//! ROTATION
//! ========
//! With rotation on, a successful exchange invalidates the presented refresh
//! token at the backend. Requests that left the browser before the new cookie
//! arrived still carry the old token, so rotated outcomes are remembered for
//! [`ROTATED_REUSE_WINDOW`] and handed to late callers instead of replaying a
//! token the backend will reject.
//!
//! TRADE-OFFS
//! ==========
//! Only an explicit rejection (400/401/403) clears the stored tokens. A
//! timeout or 5xx fails the waiting requests but leaves the refresh token in
//! place, since the backend never said it was invalid.

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use super::types::{REFRESH_PATH, RefreshBody, RefreshResponse, decode};
use crate::config::ApiConfig;
use crate::error::RefreshError;
use crate::tokens::{ACCESS_COOKIE, TokenLifetimes, TokenPair, TokenStore};

/// How long a rotated-away refresh token still resolves to its replacement.
pub const ROTATED_REUSE_WINDOW: Duration = Duration::from_secs(30);

/// Tokens returned by one successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Refreshed {
    access: String,
    refresh: Option<String>,
}

type Outcome = Result<Refreshed, RefreshError>;
type PendingRefresh = Shared<BoxFuture<'static, Outcome>>;

struct InFlight {
    id: u64,
    outcome: PendingRefresh,
}

enum Joined {
    Reused(Refreshed),
    Pending(PendingRefresh),
}

struct Rotated {
    at: Instant,
    tokens: Refreshed,
}

#[derive(Default)]
struct Slots {
    in_flight: HashMap<String, InFlight>,
    rotated: HashMap<String, Rotated>,
}

impl Slots {
    fn sweep(&mut self, now: Instant) {
        self.rotated
            .retain(|_, entry| now.duration_since(entry.at) < ROTATED_REUSE_WINDOW);
    }
}

struct Inner {
    http: reqwest::Client,
    refresh_url: String,
    lifetimes: TokenLifetimes,
    rotate_refresh_tokens: bool,
    slots: Mutex<Slots>,
    next_id: AtomicU64,
}

/// Cheap to clone; clones share the flights.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        lifetimes: TokenLifetimes,
        rotate_refresh_tokens: bool,
    ) -> Self {
        let inner = Inner {
            http,
            refresh_url: format!("{}{REFRESH_PATH}", base_url.trim_end_matches('/')),
            lifetimes,
            rotate_refresh_tokens,
            slots: Mutex::new(Slots::default()),
            next_id: AtomicU64::new(0),
        };
        Self { inner: Arc::new(inner) }
    }

    #[must_use]
    pub fn from_config(http: reqwest::Client, config: &ApiConfig) -> Self {
        Self::new(http, &config.base_url, config.lifetimes, config.rotate_refresh_tokens)
    }

    /// Obtain a new access token for `store`, joining the refresh already in
    /// flight for its refresh token if there is one. The outcome is persisted
    /// to `store` before this returns.
    ///
    /// # Errors
    ///
    /// `MissingToken` without a network call when `store` holds no refresh
    /// token. Otherwise every caller joined to the same refresh receives the
    /// same error.
    pub async fn refresh(&self, store: &Arc<dyn TokenStore>) -> Result<String, RefreshError> {
        let Some(presented) = store.refresh_token() else {
            return Err(RefreshError::MissingToken);
        };

        let joined = {
            let mut slots = self.inner.slots.lock().await;
            slots.sweep(Instant::now());
            if let Some(rotated) = slots.rotated.get(&presented) {
                tracing::debug!("refresh token already rotated, reusing its replacement");
                Joined::Reused(rotated.tokens.clone())
            } else if let Some(in_flight) = slots.in_flight.get(&presented) {
                tracing::debug!(refresh_id = in_flight.id, "joining in-flight token refresh");
                Joined::Pending(in_flight.outcome.clone())
            } else {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let outcome = Arc::clone(&self.inner)
                    .flight(id, presented.clone(), Arc::clone(store))
                    .boxed()
                    .shared();
                tracing::debug!(refresh_id = id, "starting token refresh");
                slots
                    .in_flight
                    .insert(presented.clone(), InFlight { id, outcome: outcome.clone() });
                Joined::Pending(outcome)
            }
        };

        let outcome = match joined {
            Joined::Reused(tokens) => Ok(tokens),
            Joined::Pending(pending) => pending.await,
        };
        self.inner.apply(&**store, &presented, &outcome);
        outcome.map(|tokens| tokens.access)
    }
}

impl Inner {
    async fn flight(self: Arc<Self>, id: u64, presented: String, store: Arc<dyn TokenStore>) -> Outcome {
        let outcome = self.exchange(&presented).await;
        self.apply(&*store, &presented, &outcome);
        self.settle(id, &presented, &outcome).await;
        outcome
    }

    /// Drop flight `id` from the map and remember a rotated outcome.
    async fn settle(&self, id: u64, presented: &str, outcome: &Outcome) {
        let mut slots = self.slots.lock().await;
        if slots.in_flight.get(presented).is_some_and(|in_flight| in_flight.id == id) {
            slots.in_flight.remove(presented);
        }
        if let Ok(tokens) = outcome
            && self.rotates(presented, tokens)
        {
            let entry = Rotated { at: Instant::now(), tokens: tokens.clone() };
            slots.rotated.insert(presented.to_owned(), entry);
        }
    }

    fn rotates(&self, presented: &str, tokens: &Refreshed) -> bool {
        self.rotate_refresh_tokens && tokens.refresh.as_deref().is_some_and(|next| next != presented)
    }

    async fn exchange(&self, presented: &str) -> Outcome {
        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshBody { refresh: presented })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "token refresh request failed");
                RefreshError::Transport(e.to_string())
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if matches!(status, 400 | 401 | 403) {
            tracing::info!(status, "refresh token rejected");
            return Err(RefreshError::Rejected { status });
        }
        if !(200..300).contains(&status) {
            tracing::warn!(status, "token refresh endpoint error");
            return Err(RefreshError::Status { status });
        }

        let tokens: RefreshResponse = decode(&text).map_err(|e| RefreshError::Schema(e.to_string()))?;
        Ok(Refreshed { access: tokens.access, refresh: tokens.refresh })
    }

    /// Write `outcome` into `store` unless the store has moved past the
    /// refresh token that was exchanged.
    fn apply(&self, store: &dyn TokenStore, presented: &str, outcome: &Outcome) {
        if store.refresh_token().as_deref() != Some(presented) {
            return;
        }
        match outcome {
            Ok(Refreshed { access, refresh: Some(rotated) })
                if self.rotate_refresh_tokens && rotated != presented =>
            {
                let pair = TokenPair { access: access.clone(), refresh: rotated.clone() };
                store.store_pair(&pair, self.lifetimes);
                tracing::debug!("access and rotated refresh token stored");
            }
            Ok(tokens) => {
                store.set(ACCESS_COOKIE, &tokens.access, self.lifetimes.access_secs);
                tracing::debug!("access token stored");
            }
            Err(RefreshError::Rejected { .. }) => {
                tracing::info!("clearing session tokens after refresh rejection");
                store.clear();
            }
            Err(_) => {}
        }
    }
}
