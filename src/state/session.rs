//! Session controller for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Used by route guards and user-aware views to decide between the sign-in
//! page and identity-dependent rendering. Views subscribe to [`SessionState`]
//! changes through a `watch` channel.
//!
//! DESIGN
//! ======
//! `Unknown -> {Authenticated, Anonymous}`. The controller starts `Unknown`
//! with `loading` set and resolves on the first `mount`. Any identity check
//! that fails, including a terminal 401 after a refresh attempt, clears the
//! tokens and lands in `Anonymous`.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::ApiError;
use crate::net::auth::AuthEndpoints;
use crate::net::client::ApiClient;
use crate::net::types::{CURRENT_USER_PATH, Credentials, Registration, User};
use crate::tokens::TokenStore;

/// Snapshot published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self { user: None, loading: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unknown,
    Authenticated,
    Anonymous,
}

impl SessionState {
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match (&self.user, self.loading) {
            (Some(_), _) => SessionPhase::Authenticated,
            (None, true) => SessionPhase::Unknown,
            (None, false) => SessionPhase::Anonymous,
        }
    }
}

pub struct SessionController {
    client: ApiClient,
    auth: Arc<dyn AuthEndpoints>,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    #[must_use]
    pub fn new(client: ApiClient, auth: Arc<dyn AuthEndpoints>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { client, auth, state }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    fn store(&self) -> &Arc<dyn TokenStore> {
        self.client.store()
    }

    fn resolve(&self, user: Option<User>) {
        self.state.send_replace(SessionState { user, loading: false });
    }

    /// Resolve the initial identity from whatever tokens are already stored.
    pub async fn mount(&self) -> SessionPhase {
        if self.store().access_token().is_none() {
            tracing::debug!("no access token, session anonymous");
            self.resolve(None);
            return SessionPhase::Anonymous;
        }

        match self.client.get_json::<User>(CURRENT_USER_PATH).await {
            Ok(user) => {
                tracing::debug!(user_id = user.id, "session restored");
                self.resolve(Some(user));
                SessionPhase::Authenticated
            }
            Err(e) => {
                tracing::info!(error = %e, "identity check failed, clearing session");
                self.store().clear();
                self.resolve(None);
                SessionPhase::Anonymous
            }
        }
    }

    /// Exchange credentials for a token pair and become `Authenticated`.
    ///
    /// # Errors
    ///
    /// Whatever the sign-in call returns, in which case stored tokens and the
    /// current user are left as they were. If the login response carries no
    /// identity and the follow-up profile fetch fails, the new tokens are
    /// dropped and that error is returned.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let login = match self.auth.sign_in(credentials).await {
            Ok(login) => login,
            Err(e) => {
                self.state.send_modify(|state| state.loading = false);
                return Err(e);
            }
        };
        self.store()
            .store_pair(&login.tokens(), self.client.config().lifetimes);

        let user = match login.identity() {
            Some(user) => user,
            None => match self.client.get_json::<User>(CURRENT_USER_PATH).await {
                Ok(user) => user,
                Err(e) => {
                    self.store().clear();
                    self.resolve(None);
                    return Err(e);
                }
            },
        };

        tracing::info!(user_id = user.id, username = %user.username, "signed in");
        self.resolve(Some(user.clone()));
        Ok(user)
    }

    /// Create an account. The session is not touched; the caller signs in
    /// separately.
    ///
    /// # Errors
    ///
    /// `Validation` carries the backend's field messages unchanged.
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        self.auth.sign_up(registration).await
    }

    /// Blacklist the refresh token if possible, then forget both tokens.
    /// Never fails: a backend that cannot be reached still ends the session
    /// locally.
    pub async fn logout(&self) {
        if let Some(refresh) = self.store().refresh_token()
            && let Err(e) = self.auth.blacklist(&refresh).await
        {
            tracing::warn!(error = %e, "refresh token blacklist failed");
        }
        self.store().clear();
        self.resolve(None);
        tracing::info!("signed out");
    }
}
