//! In-process mock of the backend REST API for unit tests.
//!
//! Serves the auth endpoints plus a catch-all resource handler on an
//! ephemeral port. Counters and recorded headers let tests assert exactly how
//! many refreshes, retries and blacklist calls happened. `portal` puts the
//! portal's own router in front of it for route tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};

use crate::config::ApiConfig;
use crate::net::client::ApiClient;
use crate::routes::AppState;
use crate::tokens::{SharedCookieJar, TokenStore};

/// Response delay of every path under `/slow/`.
pub const SLOW_PATH_DELAY: Duration = Duration::from_millis(150);

#[derive(Default)]
pub struct MockState {
    pub valid_access: Mutex<HashSet<String>>,
    pub valid_refresh: Mutex<HashSet<String>>,
    /// Rotate refresh tokens on each refresh.
    pub rotate: AtomicBool,
    /// Issue access tokens that protected routes will still reject.
    pub issue_rejected_access: AtomicBool,
    /// Force the refresh endpoint to answer with this status.
    pub refresh_status: Mutex<Option<u16>>,
    pub refresh_delay: Mutex<Duration>,
    pub issued: AtomicUsize,

    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub protected_calls: AtomicUsize,
    pub seen_auth: Mutex<Vec<Option<String>>>,
    pub seen_uris: Mutex<Vec<String>>,
    pub blacklisted: Mutex<Vec<String>>,
}

impl MockState {
    pub fn accept_access(&self, token: &str) {
        self.valid_access.lock().unwrap().insert(token.to_owned());
    }

    pub fn accept_refresh(&self, token: &str) {
        self.valid_refresh.lock().unwrap().insert(token.to_owned());
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn protected(&self) -> usize {
        self.protected_calls.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.seen_auth.lock().unwrap().clone()
    }

    pub fn uris(&self) -> Vec<String> {
        self.seen_uris.lock().unwrap().clone()
    }
}

pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/users/login/", post(login))
            .route("/users/register/", post(register))
            .route("/auth/token/refresh/", post(refresh))
            .route("/auth/logout/", post(logout))
            .fallback(protected)
            .with_state(Arc::clone(&state));

        Self { base_url: serve(app).await, state }
    }

    pub fn config(&self) -> ApiConfig {
        let mut config = ApiConfig::new(&self.base_url);
        config.timeouts.request_secs = 5;
        config.timeouts.connect_secs = 2;
        config
    }

    /// Client over a fresh shared jar.
    pub fn client(&self) -> (ApiClient, SharedCookieJar) {
        let jar = SharedCookieJar::default();
        let store: Arc<dyn TokenStore> = Arc::new(jar.clone());
        (ApiClient::new(&self.config(), store).unwrap(), jar)
    }

    /// Portal router in front of this backend, with non-`Secure` cookies.
    pub async fn portal(&self) -> String {
        let mut config = self.config();
        config.cookies.secure = false;
        serve(crate::routes::app(AppState::from_config(config).unwrap())).await
    }
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

/// All `Set-Cookie` header values of a response.
pub fn set_cookies(headers: &reqwest::header::HeaderMap) -> Vec<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_owned())
        .collect()
}

/// Value `name` is set to in a list of `Set-Cookie` lines.
pub fn cookie_value<'a>(set_cookies: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{name}=");
    set_cookies
        .iter()
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|rest| rest.split(';').next().unwrap_or_default())
}

/// Base URL of a port nothing listens on.
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    if body["username"] == "jdoe" && body["password"] == "secret" {
        state.accept_access("A1");
        state.accept_refresh("R1");
        let payload = json!({
            "access": "A1",
            "refresh": "R1",
            "user_id": 1,
            "username": "jdoe",
            "email": "jdoe@school.test",
            "role": "ADMIN"
        });
        return (StatusCode::OK, Json(payload)).into_response();
    }
    if body["password"] == "" {
        let errors = json!({ "password": ["This field may not be blank."] });
        return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
    }
    let detail = json!({ "detail": "No active account found with the given credentials" });
    (StatusCode::UNAUTHORIZED, Json(detail)).into_response()
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["username"] == "taken" {
        let errors = json!({ "username": ["A user with that username already exists."] });
        return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
    }
    if body["password"] != body["password2"] {
        let errors = json!({ "password": ["Password fields didn't match."] });
        return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
    }
    (StatusCode::CREATED, Json(json!({ "message": "User registered successfully" }))).into_response()
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let forced = *state.refresh_status.lock().unwrap();
    if let Some(status) = forced {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, Json(json!({ "detail": "forced" }))).into_response();
    }

    let presented = body["refresh"].as_str().unwrap_or_default().to_owned();
    if !state.valid_refresh.lock().unwrap().contains(&presented) {
        let detail = json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" });
        return (StatusCode::UNAUTHORIZED, Json(detail)).into_response();
    }

    let n = state.issued.fetch_add(1, Ordering::SeqCst) + 2;
    let access = format!("A{n}");
    if !state.issue_rejected_access.load(Ordering::SeqCst) {
        state.accept_access(&access);
    }

    if state.rotate.load(Ordering::SeqCst) {
        let rotated = format!("R{n}");
        let mut refresh_tokens = state.valid_refresh.lock().unwrap();
        refresh_tokens.remove(&presented);
        refresh_tokens.insert(rotated.clone());
        return Json(json!({ "access": access, "refresh": rotated })).into_response();
    }
    Json(json!({ "access": access })).into_response()
}

async fn logout(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> StatusCode {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    let presented = body["refresh"].as_str().unwrap_or_default().to_owned();
    state.valid_refresh.lock().unwrap().remove(&presented);
    state.blacklisted.lock().unwrap().push(presented);
    StatusCode::RESET_CONTENT
}

/// Every other path requires a valid bearer token and behaves like a
/// generic list/detail resource.
async fn protected(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    state.protected_calls.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap().to_owned());
    state.seen_auth.lock().unwrap().push(auth.clone());
    state.seen_uris.lock().unwrap().push(uri.to_string());

    // `/slow/...` answers late, so its 401 can land after another request's
    // refresh has already finished.
    if uri.path().starts_with("/slow/") {
        tokio::time::sleep(SLOW_PATH_DELAY).await;
    }

    let token = auth
        .as_deref()
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if !state.valid_access.lock().unwrap().contains(token) {
        let detail = json!({ "detail": "Given token not valid for any token type", "code": "token_not_valid" });
        return (StatusCode::UNAUTHORIZED, Json(detail)).into_response();
    }

    let path = uri.path();
    if path == "/users/me/" {
        let user = json!({
            "id": 1,
            "username": "jdoe",
            "email": "jdoe@school.test",
            "role": "ADMIN",
            "first_name": "John",
            "last_name": "Doe",
            "profile_picture": null
        });
        return Json(user).into_response();
    }
    if path.starts_with("/boom/") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }

    let id = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse::<i64>().ok());
    let payload: Value = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };

    let rows = json!([{ "id": 1, "name": "first" }, { "id": 2, "name": "second" }]);
    let paged = uri.query().is_some_and(|q| q.contains("page="));

    match (method, id) {
        (Method::GET, None) if paged => Json(json!({
            "count": 42,
            "next": format!("{path}?page=3"),
            "previous": format!("{path}?page=1"),
            "results": rows
        }))
        .into_response(),
        (Method::GET, None) => Json(rows).into_response(),
        (Method::GET, Some(id)) => Json(json!({ "id": id, "name": "detail" })).into_response(),
        (Method::POST, None) => {
            if payload.get("first_name").is_none() {
                let errors = json!({ "first_name": ["This field is required."] });
                return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
            }
            let mut created = payload;
            created["id"] = json!(99);
            // Bulk messages are queued for delivery rather than created.
            let status = if path.starts_with("/communications/bulk-messages/") {
                StatusCode::ACCEPTED
            } else {
                StatusCode::CREATED
            };
            (status, Json(created)).into_response()
        }
        (Method::PUT | Method::PATCH, Some(id)) => {
            let mut updated = payload;
            updated["id"] = json!(id);
            Json(updated).into_response()
        }
        (Method::DELETE, Some(_)) => StatusCode::NO_CONTENT.into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}
