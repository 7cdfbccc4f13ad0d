//! Authenticated access to the school management backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two callers share this crate:
//!
//! - code in the client process, which keeps tokens in a process-wide
//!   [`tokens::SharedCookieJar`] and tracks the signed-in user with
//!   [`state::session::SessionController`]
//! - the portal's HTTP server ([`routes::app`]), which keeps tokens in the
//!   browser's cookies and builds a request-scoped client per request
//!
//! Both go through [`net::client::ApiClient`], which attaches the bearer
//! token and recovers from an expired access token with one deduplicated
//! refresh and one retry.

pub mod config;
pub mod error;
pub mod net;
pub mod routes;
pub mod services;
pub mod state;
pub mod tokens;

#[cfg(test)]
mod test_helpers;

pub use config::{ApiConfig, ServerConfig};
pub use error::{ApiError, FieldErrors, RefreshError};
pub use net::client::{ApiClient, ApiRequest};
pub use tokens::{RequestCookies, SharedCookieJar, TokenPair, TokenStore};
