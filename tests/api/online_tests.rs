//! Online Presence API Tests

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{test_settings, unique_user, TestApp};

#[tokio::test]
async fn test_no_one_online_initially() {
    let app = TestApp::new().await;

    let response = app.server.get("/ws/online").await;

    response.assert_status_ok();
    response.assert_json(&json!({ "users": [] }));
}

#[tokio::test]
async fn test_connected_user_is_listed_until_unregistered() {
    let app = TestApp::new().await;
    let user = unique_user();
    let (conn, _queue) = app.connect(&user).await;

    let body: Value = app.server.get("/ws/online").await.json();
    assert_eq!(body["users"], json!([user.clone()]));

    let response = app.server.get(&format!("/ws/online/{}", user)).await;
    response.assert_json(&json!({ "user_id": user.clone(), "online": true }));

    app.hub().unregister(conn).await;

    let response = app.server.get(&format!("/ws/online/{}", user)).await;
    response.assert_json(&json!({ "user_id": user, "online": false }));
}

#[tokio::test]
async fn test_unknown_user_is_offline() {
    let app = TestApp::new().await;

    let response = app.server.get("/ws/online/nobody").await;

    response.assert_json(&json!({ "user_id": "nobody", "online": false }));
}

#[tokio::test]
async fn test_local_membership_answers_when_presence_disabled() {
    let mut settings = test_settings();
    settings.presence.enabled = false;
    let app = TestApp::with_settings(settings).await;
    let user = unique_user();
    let (_conn, _queue) = app.connect(&user).await;

    let body: Value = app.server.get("/ws/online").await.json();
    assert_eq!(body["users"], json!([user.clone()]));

    let body: Value = app.server.get(&format!("/ws/online/{}", user)).await.json();
    assert_eq!(body["online"], json!(true));
}

#[tokio::test]
async fn test_presence_survives_second_connection_closing() {
    let app = TestApp::new().await;
    let user = unique_user();
    let (phone, _q1) = app.connect(&user).await;
    let (_laptop, _q2) = app.connect(&user).await;

    app.hub().unregister(phone).await;

    let body: Value = app.server.get(&format!("/ws/online/{}", user)).await.json();
    assert_eq!(body["online"], json!(true));
}
