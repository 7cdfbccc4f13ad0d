//! Resource proxy routes: `/api/{resource}/`, `/api/{resource}/{id}/` and
//! the read-only `/api/reports/{report}/`.
//!
//! Each handler runs its backend call through a client bound to the
//! request's cookies, so an expired access token is refreshed in place and
//! the new cookie rides back on the same response.

#[cfg(test)]
#[path = "resources_test.rs"]
mod tests;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Value, json};

use super::{AppState, error_response};
use crate::services::resources::{Resource, ResourceClient};
use crate::tokens::RequestCookies;

fn scoped(state: &AppState, cookies: &RequestCookies, segment: &str) -> Result<ResourceClient, Response> {
    let Some(resource) = Resource::from_segment(segment) else {
        return Err((StatusCode::NOT_FOUND, Json(json!({ "error": format!("unknown resource '{segment}'") }))).into_response());
    };
    Ok(ResourceClient::new(state.client_for(cookies), resource))
}

async fn list_segment(
    state: &AppState,
    cookies: &RequestCookies,
    segment: &str,
    query: &[(String, String)],
) -> Response {
    let resources = match scoped(state, cookies, segment) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match resources.list(query).await {
        Ok(listing) => (cookies.jar(), Json(listing)).into_response(),
        Err(e) => error_response(&e, cookies),
    }
}

/// `GET /api/{resource}/`: list, forwarding query parameters.
pub async fn list(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Path(segment): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    list_segment(&state, &cookies, &segment, &query).await
}

/// `GET /api/reports/{report}/`: read-only report listing.
pub async fn report(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Path(report): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    list_segment(&state, &cookies, &format!("reports/{report}"), &query).await
}

/// `POST /api/{resource}/`
pub async fn create(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Path(segment): Path<String>,
    Json(record): Json<Value>,
) -> Response {
    let resources = match scoped(&state, &cookies, &segment) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match resources.create(record).await {
        Ok((status, created)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::CREATED);
            (status, cookies.jar(), Json(created)).into_response()
        }
        Err(e) => error_response(&e, &cookies),
    }
}

/// `GET /api/{resource}/{id}/`
pub async fn retrieve(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Path((segment, id)): Path<(String, i64)>,
) -> Response {
    let resources = match scoped(&state, &cookies, &segment) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match resources.get(id).await {
        Ok(record) => (cookies.jar(), Json(record)).into_response(),
        Err(e) => error_response(&e, &cookies),
    }
}

/// `PUT /api/{resource}/{id}/`
pub async fn update(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Path((segment, id)): Path<(String, i64)>,
    Json(record): Json<Value>,
) -> Response {
    let resources = match scoped(&state, &cookies, &segment) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match resources.update(id, record).await {
        Ok(updated) => (cookies.jar(), Json(updated)).into_response(),
        Err(e) => error_response(&e, &cookies),
    }
}

/// `PATCH /api/{resource}/{id}/`
pub async fn patch(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Path((segment, id)): Path<(String, i64)>,
    Json(fields): Json<Value>,
) -> Response {
    let resources = match scoped(&state, &cookies, &segment) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match resources.patch(id, fields).await {
        Ok(updated) => (cookies.jar(), Json(updated)).into_response(),
        Err(e) => error_response(&e, &cookies),
    }
}

/// `DELETE /api/{resource}/{id}/`
pub async fn destroy(
    State(state): State<AppState>,
    cookies: RequestCookies,
    Path((segment, id)): Path<(String, i64)>,
) -> Response {
    let resources = match scoped(&state, &cookies, &segment) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match resources.delete(id).await {
        Ok(()) => (cookies.jar(), StatusCode::NO_CONTENT).into_response(),
        Err(e) => error_response(&e, &cookies),
    }
}
