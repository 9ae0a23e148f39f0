//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use axum_test::TestServer;
use chrono::Utc;
use fake::{faker::internet::en::Username, Fake};
use tokio::sync::mpsc;

use notify_hub::config::Settings;
use notify_hub::domain::{MessageType, WireMessage};
use notify_hub::infrastructure::connect_backends;
use notify_hub::presentation::websocket::{attach, Connection, Hub};
use notify_hub::startup::{build_router, AppState};

/// Test application backed by the in-memory stores
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

impl TestApp {
    /// Create a test application with default test settings
    pub async fn new() -> Self {
        Self::with_settings(test_settings()).await
    }

    /// Create a test application with custom settings
    pub async fn with_settings(settings: Settings) -> Self {
        let backends = connect_backends(&settings)
            .await
            .expect("Failed to build in-memory backends");
        let state = AppState::new(settings, backends);
        let server =
            TestServer::new(build_router(state.clone())).expect("Failed to start test server");

        Self { server, state }
    }

    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    /// Attach a connection for `user_id` the way the upgrade handler does
    pub async fn connect(&self, user_id: &str) -> (Arc<Connection>, mpsc::Receiver<Utf8Bytes>) {
        attach(
            &self.state.hub,
            user_id,
            self.state.settings.hub.outbound_queue_capacity,
        )
        .await
    }
}

/// Settings for the in-memory backend, cache store only
pub fn test_settings() -> Settings {
    Settings::defaults().expect("Default settings should load")
}

/// Generate a unique user id
pub fn unique_user() -> String {
    let name: String = Username().fake();
    format!("{}_{}", name, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// A chat frame as a client would send it
pub fn chat_frame(to: &str, text: &str) -> String {
    serde_json::json!({ "type": "chat", "to": to, "content": text }).to_string()
}

/// A stamped chat payload as the hub would route it
pub fn chat_payload(from: &str, to: &str, text: &str) -> Utf8Bytes {
    let mut message = WireMessage::new(MessageType::Chat, text).to(to);
    message.stamp(from, Utc::now());
    serde_json::to_string(&message)
        .expect("Message should serialize")
        .into()
}
