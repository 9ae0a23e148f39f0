//! Metrics Endpoint Tests

use crate::common::TestApp;

#[tokio::test]
async fn test_metrics_are_exposed() {
    let app = TestApp::new().await;
    let (_conn, _queue) = app.connect("metrics-user").await;

    let response = app.server.get("/metrics").await;

    response.assert_status_ok();
    let text = response.text();
    assert!(text.contains("notify_hub_websocket_connections_active"));
}
