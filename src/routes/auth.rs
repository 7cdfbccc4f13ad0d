//! Auth routes: sign-in, sign-up, sign-out, and the current user.
//!
//! Sign-in stores the backend's token pair in the browser as `HttpOnly`
//! cookies; the pages only ever learn whether it worked.

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use super::{AppState, error_response};
use crate::error::{ApiError, FieldErrors};
use crate::net::types::{CURRENT_USER_PATH, Credentials, Registration, User};
use crate::tokens::{RequestCookies, TokenStore};

const SIGN_IN_FAILED: &str = "Failed to sign in";
const UNEXPECTED: &str = "An unexpected error occurred";

fn status_or(status: u16, fallback: StatusCode) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(fallback)
}

/// `POST /api/auth/sign-in`: exchange credentials, set both token cookies.
pub async fn sign_in(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Json(credentials): Json<Credentials>,
) -> Response {
    match state.auth.sign_in(&credentials).await {
        Ok(login) => {
            cookies.store_pair(&login.tokens(), state.config.lifetimes);
            tracing::info!(username = %credentials.username, "signed in");
            (cookies.jar(), Json(json!({ "message": "Successfully signed in" }))).into_response()
        }
        Err(e) => {
            let (status, detail) = match &e {
                ApiError::Status { status, body } => (
                    status_or(*status, StatusCode::INTERNAL_SERVER_ERROR),
                    FieldErrors::parse(body).and_then(|f| f.detail().map(str::to_owned)),
                ),
                other => {
                    tracing::error!(error = %other, "sign-in failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, None)
                }
            };
            let message = detail.unwrap_or_else(|| SIGN_IN_FAILED.to_owned());
            (status, Json(json!({ "error": message }))).into_response()
        }
    }
}

/// `POST /api/auth/sign-up`: register; field errors come back verbatim.
pub async fn sign_up(State(state): State<AppState>, Json(registration): Json<Registration>) -> Response {
    let err = match state.auth.sign_up(&registration).await {
        Ok(()) => {
            return (StatusCode::CREATED, Json(json!({ "message": "Successfully signed up" }))).into_response();
        }
        Err(e) => e,
    };

    match &err {
        ApiError::Validation(fields) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "errors": fields }))).into_response();
        }
        ApiError::Status { status, body } => {
            if let Ok(errors) = serde_json::from_str::<serde_json::Value>(body) {
                let code = status_or(*status, StatusCode::BAD_REQUEST);
                return (code, Json(json!({ "errors": errors }))).into_response();
            }
        }
        _ => {}
    }

    tracing::error!(error = %err, "sign-up failed");
    let errors = FieldErrors::general(UNEXPECTED);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "errors": errors }))).into_response()
}

/// `POST /api/auth/logout`: blacklist the refresh token if we can, always
/// expire both cookies.
pub async fn logout(State(state): State<AppState>, cookies: RequestCookies) -> impl IntoResponse {
    if let Some(refresh) = cookies.refresh_token()
        && let Err(e) = state.auth.blacklist(&refresh).await
    {
        tracing::warn!(error = %e, "refresh token blacklist failed");
    }
    cookies.clear();
    (cookies.jar(), StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`: current user. An expired access cookie is refreshed
/// transparently and the new cookie returned with the profile.
pub async fn me(State(state): State<AppState>, cookies: RequestCookies) -> Response {
    if cookies.access_token().is_none() && cookies.refresh_token().is_none() {
        return error_response(&ApiError::AuthTerminal { refresh: None }, &cookies);
    }

    match state.client_for(&cookies).get_json::<User>(CURRENT_USER_PATH).await {
        Ok(user) => (cookies.jar(), Json(user)).into_response(),
        Err(e) => error_response(&e, &cookies),
    }
}
