use crate::test_helpers::{MockBackend, cookie_value, set_cookies};
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use serde_json::{Value, json};
use std::sync::atomic::Ordering;
use std::time::Duration;

async fn signed_in() -> (MockBackend, String) {
    let backend = MockBackend::spawn().await;
    backend.state.accept_access("A1");
    let portal = backend.portal().await;
    (backend, portal)
}

#[tokio::test]
async fn list_normalizes_plain_array() {
    let (_backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .get(format!("{portal}/api/staff/"))
        .header(COOKIE, "access=A1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["next"], Value::Null);
    assert_eq!(body["results"][0]["name"], "first");
}

#[tokio::test]
async fn list_forwards_query_to_backend() {
    let (backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .get(format!("{portal}/api/bulk-messages/?page=2&recipient_group=parents"))
        .header(COOKIE, "access=A1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 42);
    assert_eq!(
        backend.state.uris(),
        vec!["/communications/bulk-messages/?page=2&recipient_group=parents".to_owned()]
    );
}

#[tokio::test]
async fn unknown_resource_is_404() {
    let (backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .get(format!("{portal}/api/grades/"))
        .header(COOKIE, "access=A1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.state.protected(), 0);
}

#[tokio::test]
async fn create_returns_201() {
    let (_backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .post(format!("{portal}/api/students/"))
        .header(COOKIE, "access=A1")
        .json(&json!({ "first_name": "Ana", "last_name": "Lopez" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], 99);
}

#[tokio::test]
async fn create_field_errors_are_400() {
    let (_backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .post(format!("{portal}/api/students/"))
        .header(COOKIE, "access=A1")
        .json(&json!({ "last_name": "Lopez" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "errors": { "first_name": ["This field is required."] } }));
}

#[tokio::test]
async fn retrieve_refreshes_and_returns_new_cookie() {
    let backend = MockBackend::spawn().await;
    backend.state.accept_refresh("R1");
    let portal = backend.portal().await;

    let response = reqwest::Client::new()
        .get(format!("{portal}/api/payroll/5/"))
        .header(COOKIE, "access=EXPIRED; refresh=R1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backend.state.refreshes(), 1);
    assert_eq!(cookie_value(&set_cookies(response.headers()), "access"), Some("A2"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], 5);
}

#[tokio::test]
async fn update_patch_and_delete() {
    let (backend, portal) = signed_in().await;
    let http = reqwest::Client::new();

    let put = http
        .put(format!("{portal}/api/parents/4/"))
        .header(COOKIE, "access=A1")
        .json(&json!({ "phone": "555-0100" }))
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::OK);
    assert_eq!(put.json::<Value>().await.unwrap(), json!({ "phone": "555-0100", "id": 4 }));

    let patch = http
        .patch(format!("{portal}/api/parents/4/"))
        .header(COOKIE, "access=A1")
        .json(&json!({ "phone": "555-0199" }))
        .send()
        .await
        .unwrap();
    assert_eq!(patch.status(), StatusCode::OK);

    let delete = http
        .delete(format!("{portal}/api/parents/4/"))
        .header(COOKIE, "access=A1")
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    assert!(backend.state.uris().iter().all(|u| u == "/users/parents/4/"));
}

#[tokio::test]
async fn anonymous_request_is_401() {
    let backend = MockBackend::spawn().await;
    let portal = backend.portal().await;

    let response = reqwest::Client::new()
        .get(format!("{portal}/api/users/"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "authentication required");
}

#[tokio::test]
async fn create_keeps_backend_success_status() {
    let (_backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .post(format!("{portal}/api/bulk-messages/"))
        .header(COOKIE, "access=A1")
        .json(&json!({ "subject": "Closure", "recipient_group": "parents" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["subject"], "Closure");
}

#[tokio::test]
async fn student_performance_report_is_listed() {
    let (backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .get(format!("{portal}/api/reports/student-performance/?course=3"))
        .header(COOKIE, "access=A1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(backend.state.uris(), vec!["/reports/student-performance/?course=3".to_owned()]);
}

#[tokio::test]
async fn unknown_report_is_404() {
    let (backend, portal) = signed_in().await;

    let response = reqwest::Client::new()
        .get(format!("{portal}/api/reports/salaries/"))
        .header(COOKIE, "access=A1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.state.protected(), 0);
}

// =============================================================================
// shared refresh across browser requests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_with_one_session_share_one_refresh() {
    let backend = MockBackend::spawn().await;
    backend.state.accept_refresh("R1");
    backend.state.rotate.store(true, Ordering::SeqCst);
    *backend.state.refresh_delay.lock().unwrap() = Duration::from_millis(200);
    let portal = backend.portal().await;
    let http = reqwest::Client::new();

    let calls = (0..3).map(|_| {
        http.get(format!("{portal}/api/staff/"))
            .header(COOKIE, "access=EXPIRED; refresh=R1")
            .send()
    });
    let responses = futures::future::join_all(calls).await;

    assert_eq!(backend.state.refreshes(), 1);
    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(response.headers());
        assert_eq!(cookie_value(&cookies, "access"), Some("A2"));
        assert_eq!(cookie_value(&cookies, "refresh"), Some("R2"));
    }
}

#[tokio::test]
async fn request_with_rotated_away_cookie_keeps_the_session() {
    let backend = MockBackend::spawn().await;
    backend.state.accept_refresh("R1");
    backend.state.rotate.store(true, Ordering::SeqCst);
    let portal = backend.portal().await;
    let http = reqwest::Client::new();

    let first = http
        .get(format!("{portal}/api/staff/"))
        .header(COOKIE, "access=EXPIRED; refresh=R1")
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // Sent before the browser stored the rotated cookie.
    let late = http
        .get(format!("{portal}/api/students/"))
        .header(COOKIE, "access=EXPIRED; refresh=R1")
        .send()
        .await
        .unwrap();

    assert_eq!(late.status(), StatusCode::OK);
    assert_eq!(backend.state.refreshes(), 1);
    let cookies = set_cookies(late.headers());
    assert_eq!(cookie_value(&cookies, "access"), Some("A2"));
    assert_eq!(cookie_value(&cookies, "refresh"), Some("R2"));
}
