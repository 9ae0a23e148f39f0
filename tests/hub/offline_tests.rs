//! Offline buffering through both backends

use pretty_assertions::assert_eq;
use serde_json::json;

use notify_hub::domain::{MessageType, OfflineMessage, WireMessage};
use notify_hub::presentation::websocket::connection::handle_frame;

use crate::common::{chat_frame, test_settings, TestApp};

fn log_only_app_settings() -> notify_hub::config::Settings {
    let mut settings = test_settings();
    settings.offline.cache_enabled = false;
    settings.offline.log_enabled = true;
    settings
}

#[tokio::test]
async fn test_offline_chat_is_replayed_on_connect() {
    let app = TestApp::new().await;
    let (alice, _qa) = app.connect("alice").await;

    handle_frame(&alice, app.hub(), &chat_frame("bob", "hi")).await;

    let (_bob, mut queue) = app.connect("bob").await;
    let replayed: OfflineMessage = serde_json::from_str(queue.recv().await.unwrap().as_str()).unwrap();
    assert_eq!(replayed.from, "alice");
    assert_eq!(replayed.to, "bob");
    assert_eq!(replayed.content, json!("hi"));
    assert!(!replayed.is_read());

    let store = app.hub().context().cache_store.clone().unwrap();
    assert!(store.get_offline_messages("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_offline_message_keeps_all_fields() {
    let app = TestApp::new().await;
    let mut message = WireMessage::new(MessageType::Like, json!({ "title": "Sunset" }))
        .to("bob")
        .with_post("post-7");
    message.extra.action_type = Some("double_tap".into());
    message.extra.url = Some("/posts/post-7".into());
    message.stamp("alice", chrono::Utc::now());

    app.hub()
        .send_to_user("bob", serde_json::to_string(&message).unwrap().into())
        .await
        .unwrap();

    let store = app.hub().context().cache_store.clone().unwrap();
    let stored = store.get_offline_messages("bob").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, MessageType::Like);
    assert_eq!(stored[0].from, "alice");
    assert_eq!(stored[0].to, "bob");
    assert_eq!(stored[0].content, json!({ "title": "Sunset" }));
    assert_eq!(stored[0].extra, message.extra);
}

#[tokio::test]
async fn test_log_store_replay_is_not_destructive() {
    let app = TestApp::with_settings(log_only_app_settings()).await;
    let (alice, _qa) = app.connect("alice").await;

    handle_frame(&alice, app.hub(), &chat_frame("bob", "first")).await;
    handle_frame(&alice, app.hub(), &chat_frame("dave", "other")).await;

    let store = app.hub().context().log_store.clone().unwrap();
    let once = store.get_offline_messages("bob").await.unwrap();
    let twice = store.get_offline_messages("bob").await.unwrap();
    assert_eq!(once.len(), 1);
    assert_eq!(once, twice);

    let (_bob, mut queue) = app.connect("bob").await;
    let replayed: OfflineMessage = serde_json::from_str(queue.recv().await.unwrap().as_str()).unwrap();
    assert_eq!(replayed.content, json!("first"));
}

#[tokio::test]
async fn test_log_store_tombstones_apply_on_replay() {
    let app = TestApp::with_settings(log_only_app_settings()).await;
    let (alice, _qa) = app.connect("alice").await;
    handle_frame(&alice, app.hub(), &chat_frame("bob", "keep")).await;
    handle_frame(&alice, app.hub(), &chat_frame("bob", "drop")).await;

    let store = app.hub().context().log_store.clone().unwrap();
    let messages = store.get_offline_messages("bob").await.unwrap();
    assert_eq!(messages.len(), 2);
    store.mark_message_as_read(&messages[0].id).await.unwrap();
    store.delete_message(&messages[1].id).await.unwrap();

    let messages = store.get_offline_messages("bob").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, json!("keep"));
    assert!(messages[0].is_read());
}

#[tokio::test]
async fn test_system_notices_keep_separate_tombstones() {
    let app = TestApp::with_settings(log_only_app_settings()).await;
    let users: Vec<String> = (0..20).map(|i| format!("user{}", i)).collect();
    for user in &users {
        let notice = WireMessage::new(MessageType::System, "maintenance at noon").to(user);
        app.hub().notify(notice).await.unwrap();
    }

    let store = app.hub().context().log_store.clone().unwrap();
    let mut ids = Vec::new();
    for user in &users {
        let messages = store.get_offline_messages(user).await.unwrap();
        assert_eq!(messages.len(), 1);
        ids.push(messages[0].id.clone());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), users.len());

    let first = store.get_offline_messages(&users[0]).await.unwrap();
    store.delete_message(&first[0].id).await.unwrap();
    store.mark_message_as_read(&first[0].id).await.unwrap();

    assert!(store.get_offline_messages(&users[0]).await.unwrap().is_empty());
    for user in &users[1..] {
        let messages = store.get_offline_messages(user).await.unwrap();
        assert_eq!(messages.len(), 1, "{} lost its notice", user);
        assert!(!messages[0].is_read());
    }
}

#[tokio::test]
async fn test_no_store_enabled_drops_without_error() {
    let mut settings = test_settings();
    settings.offline.cache_enabled = false;
    let app = TestApp::with_settings(settings).await;
    let (alice, _qa) = app.connect("alice").await;

    handle_frame(&alice, app.hub(), &chat_frame("bob", "lost")).await;

    let (_bob, mut queue) = app.connect("bob").await;
    assert!(queue.try_recv().is_err());
}
