//! Wire types shared by the access layer and the server tier.
//!
//! DESIGN
//! ======
//! Every backend body is deserialized into one of these structs before it is
//! handed upward. A body that does not fit becomes `ApiError::Schema`, so
//! callers never see half-parsed JSON.

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::tokens::TokenPair;

pub const LOGIN_PATH: &str = "/users/login/";
pub const REGISTER_PATH: &str = "/users/register/";
pub const CURRENT_USER_PATH: &str = "/users/me/";
pub const REFRESH_PATH: &str = "/auth/token/refresh/";
pub const LOGOUT_PATH: &str = "/auth/logout/";

// =============================================================================
// USER
// =============================================================================

/// Profile returned by `GET /users/me/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

// =============================================================================
// SIGN-IN
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self { username: username.to_owned(), password: password.to_owned() }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST /users/login/` response. The backend echoes a few identity fields
/// next to the token pair.
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl LoginResponse {
    #[must_use]
    pub fn tokens(&self) -> TokenPair {
        TokenPair { access: self.access.clone(), refresh: self.refresh.clone() }
    }

    /// Partial profile from the echoed identity fields, when both id and
    /// username are present.
    #[must_use]
    pub fn identity(&self) -> Option<User> {
        let (Some(id), Some(username)) = (self.user_id, self.username.clone()) else {
            return None;
        };
        Some(User {
            id,
            username,
            email: self.email.clone().unwrap_or_default(),
            role: self.role.clone().unwrap_or_default(),
            first_name: String::new(),
            last_name: String::new(),
            profile_picture: None,
        })
    }
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SIGN-UP
// =============================================================================

/// Sign-up form as posted by the browser pages.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Field names the backend's registration serializer expects.
#[derive(Serialize)]
pub(crate) struct RegisterBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    password2: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

impl<'a> From<&'a Registration> for RegisterBody<'a> {
    fn from(form: &'a Registration) -> Self {
        Self {
            username: &form.username,
            email: &form.email,
            password: &form.password,
            password2: &form.confirm_password,
            first_name: &form.first_name,
            last_name: &form.last_name,
            role: form.role.as_deref(),
        }
    }
}

// =============================================================================
// REFRESH / LOGOUT
// =============================================================================

/// `{ "refresh": ... }`: body of both the refresh and the logout call.
#[derive(Serialize)]
pub(crate) struct RefreshBody<'a> {
    pub refresh: &'a str,
}

#[derive(Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    pub refresh: Option<String>,
}

// =============================================================================
// LISTS
// =============================================================================

/// List bodies come either as a bare array or wrapped in a page envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListBody<T> {
    Page {
        count: u64,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
        results: Vec<T>,
    },
    Plain(Vec<T>),
}

/// Normalized list result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> From<ListBody<T>> for Listing<T> {
    fn from(body: ListBody<T>) -> Self {
        match body {
            ListBody::Page { count, next, previous, results } => Self { count, next, previous, results },
            ListBody::Plain(results) => Self {
                count: results.len() as u64,
                next: None,
                previous: None,
                results,
            },
        }
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Structurally validate a success body.
pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Schema(e.to_string()))
}
