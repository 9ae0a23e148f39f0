//! Direct, broadcast, and eviction scenarios

use pretty_assertions::assert_eq;
use serde_json::json;

use notify_hub::domain::{MessageType, WireMessage};
use notify_hub::presentation::websocket::connection::handle_frame;
use notify_hub::presentation::websocket::Connection;

use crate::common::{chat_frame, chat_payload, test_settings, TestApp};

fn decode(payload: &str) -> WireMessage {
    serde_json::from_str(payload).expect("Delivered payload should be a wire message")
}

#[tokio::test]
async fn test_chat_with_target_reaches_only_that_user() {
    let app = TestApp::new().await;
    let (alice, _qa) = app.connect("alice").await;
    let (_bob, mut qb) = app.connect("bob").await;
    let (_carol, mut qc) = app.connect("carol").await;

    handle_frame(&alice, app.hub(), &chat_frame("bob", "hi")).await;

    let message = decode(qb.recv().await.unwrap().as_str());
    assert_eq!(message.from, "alice");
    assert_eq!(message.to.as_deref(), Some("bob"));
    assert!(qc.try_recv().is_err());
}

#[tokio::test]
async fn test_chat_without_target_is_broadcast() {
    let app = TestApp::new().await;
    let (alice, mut qa) = app.connect("alice").await;
    let (_bob, mut qb) = app.connect("bob").await;

    let frame = json!({ "type": "chat", "content": "hello all" }).to_string();
    handle_frame(&alice, app.hub(), &frame).await;

    assert_eq!(decode(qa.recv().await.unwrap().as_str()).content, json!("hello all"));
    assert_eq!(decode(qb.recv().await.unwrap().as_str()).content, json!("hello all"));
}

#[tokio::test]
async fn test_post_notification_needs_post_id() {
    let app = TestApp::new().await;
    let (alice, _qa) = app.connect("alice").await;
    let (_bob, mut qb) = app.connect("bob").await;

    let without_post = json!({ "type": "like", "to": "bob", "content": "liked" }).to_string();
    handle_frame(&alice, app.hub(), &without_post).await;
    assert!(qb.try_recv().is_err());

    let with_post = json!({
        "type": "comment",
        "to": "bob",
        "content": "nice",
        "extra": { "postId": "p-1", "commentId": "c-9" }
    })
    .to_string();
    handle_frame(&alice, app.hub(), &with_post).await;

    let message = decode(qb.recv().await.unwrap().as_str());
    assert_eq!(message.kind, MessageType::Comment);
    assert_eq!(message.extra.post_id.as_deref(), Some("p-1"));
    assert_eq!(message.extra.comment_id.as_deref(), Some("c-9"));
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let app = TestApp::new().await;
    let (alice, _qa) = app.connect("alice").await;

    handle_frame(&alice, app.hub(), "{not json").await;

    assert!(app.hub().contains(alice.id()));
}

#[tokio::test]
async fn test_full_queue_is_evicted_on_broadcast() {
    let mut settings = test_settings();
    settings.hub.outbound_queue_capacity = 3;
    let app = TestApp::with_settings(settings).await;
    let (slow, _queue) = app.connect("slow").await;

    for i in 0..3 {
        app.hub().broadcast(format!("msg-{}", i).into()).await;
        assert!(app.hub().contains(slow.id()));
    }
    app.hub().broadcast("one too many".into()).await;

    assert!(!app.hub().contains(slow.id()));
    assert!(slow.outbound().is_closed());

    // Later direct sends fall through to the offline store.
    app.hub()
        .send_to_user("slow", chat_payload("alice", "slow", "are you there"))
        .await
        .unwrap();
    let store = app.hub().context().cache_store.clone().unwrap();
    let buffered = store.get_offline_messages("slow").await.unwrap();
    assert_eq!(buffered.len(), 1);
    assert_eq!(buffered[0].content, json!("are you there"));
}

#[tokio::test]
async fn test_same_user_gets_single_delivery() {
    let app = TestApp::new().await;
    let (_phone, mut q1) = app.connect("bob").await;
    let (_laptop, mut q2) = app.connect("bob").await;

    app.hub()
        .send_to_user("bob", chat_payload("alice", "bob", "once"))
        .await
        .unwrap();

    let delivered = [q1.try_recv().is_ok(), q2.try_recv().is_ok()];
    assert_eq!(delivered.iter().filter(|d| **d).count(), 1);
}

#[tokio::test]
async fn test_system_notification_is_routed() {
    let app = TestApp::new().await;
    let (_bob, mut queue) = app.connect("bob").await;

    let message = WireMessage::new(MessageType::Mention, "you were mentioned").to("bob");
    app.hub().notify(message).await.unwrap();

    let delivered = decode(queue.recv().await.unwrap().as_str());
    assert_eq!(delivered.from, "system");
}

#[tokio::test]
async fn test_connection_ids_differ_on_reconnect() {
    let (first, _q1) = Connection::new("bob", 1);
    let (second, _q2) = Connection::new("bob", 1);
    assert_ne!(first.id(), second.id());
}
