//! WebSocket Upgrade Tests
//!
//! The identity check runs before the upgrade, so plain HTTP requests are
//! enough to exercise it.

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_missing_user_id_is_rejected() {
    let app = TestApp::new().await;

    let response = app.server.get("/ws").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], 10002);
    assert!(body["message"].as_str().unwrap().contains("user_id"));
    assert_eq!(app.hub().connection_count(), 0);
}

#[tokio::test]
async fn test_empty_user_id_is_rejected() {
    let app = TestApp::new().await;

    let response = app.server.get("/ws").add_query_param("user_id", "").await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_user_id_is_rejected() {
    let app = TestApp::new().await;
    let user_id = "x".repeat(129);

    let response = app.server.get("/ws").add_query_param("user_id", &user_id).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], 10007);
}

#[tokio::test]
async fn test_non_upgrade_request_creates_no_connection() {
    let app = TestApp::new().await;

    let response = app
        .server
        .get("/ws")
        .add_query_param("user_id", "alice")
        .expect_failure()
        .await;

    assert!(response.status_code().is_client_error());
    assert_eq!(app.hub().connection_count(), 0);
}
