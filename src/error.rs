//! Error taxonomy for the API access layer.
//!
//! DESIGN
//! ======
//! `ApiError` is what callers of the request client see. `RefreshError` is the
//! outcome of a single refresh round-trip; it is `Clone` because one outcome is
//! handed to every request waiting on the same refresh.
//!
//! The first 401 on a request is control flow inside the client, never an
//! error value. Only the exhausted case surfaces, as `AuthTerminal`.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use std::collections::BTreeMap;

use serde::Serialize;

// =============================================================================
// API ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// Network unreachable, connection reset, or timeout. Never retried.
    #[error("request failed: {0}")]
    Transport(String),

    /// The server rejected our credentials and no further recovery is possible.
    #[error("authentication required")]
    AuthTerminal { refresh: Option<RefreshError> },

    /// The server rejected the payload with per-field messages.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// A success body did not match the expected shape.
    #[error("unexpected response shape: {0}")]
    Schema(String),

    /// Any other non-success status.
    #[error("API response error: status {status}")]
    Status { status: u16, body: String },
}

impl ApiError {
    /// True when the caller should treat the user as logged out.
    #[must_use]
    pub fn is_auth_terminal(&self) -> bool {
        matches!(self, Self::AuthTerminal { .. })
    }

    pub(crate) fn transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

// =============================================================================
// REFRESH ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// No refresh token is stored; no network call was made.
    #[error("no refresh token available")]
    MissingToken,

    /// The refresh endpoint refused the refresh token (expired or revoked).
    /// Both tokens have been cleared from the store.
    #[error("refresh token rejected: status {status}")]
    Rejected { status: u16 },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh endpoint error: status {status}")]
    Status { status: u16 },

    #[error("refresh response malformed: {0}")]
    Schema(String),
}

// =============================================================================
// FIELD ERRORS
// =============================================================================

/// Field-level validation messages, `{ field: [messages] }`.
///
/// The backend sometimes sends a bare string instead of a list, and nested
/// serializers send objects; both are normalized to a list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Parse an error body. Returns `None` unless the body is a non-empty JSON object.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) else {
            return None;
        };
        if map.is_empty() {
            return None;
        }

        let fields = map
            .into_iter()
            .map(|(field, value)| (field, messages(value)))
            .collect();
        Some(Self(fields))
    }

    /// Build from a single `general` message.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("general".to_owned(), vec![message.into()]);
        Self(fields)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// The first `detail` message, which the backend uses for non-field errors.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.get("detail")
            .and_then(<[String]>::first)
            .map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

fn messages(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s],
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}
