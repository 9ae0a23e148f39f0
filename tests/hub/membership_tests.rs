//! Registration and unregistration under concurrency

use futures::future::join_all;

use crate::common::{unique_user, TestApp};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_unregister_leaves_no_members() {
    let app = TestApp::new().await;

    let tasks = (0..32).map(|_| {
        let hub = app.hub().clone();
        let queue_capacity = app.state.settings.hub.outbound_queue_capacity;
        tokio::spawn(async move {
            let user = unique_user();
            let (conn, _queue) =
                notify_hub::presentation::websocket::attach(&hub, &user, queue_capacity).await;
            assert!(hub.contains(conn.id()));
            hub.unregister(conn.clone()).await;
            conn
        })
    });

    let conns: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(app.hub().connection_count(), 0);
    for conn in conns {
        assert!(!app.hub().contains(conn.id()));
        assert!(conn.outbound().is_closed());
    }
    assert!(app.hub().online_users().await.is_empty());
}

#[tokio::test]
async fn test_unregister_twice_is_harmless() {
    let app = TestApp::new().await;
    let (conn, _queue) = app.connect("alice").await;
    let (other, _other_queue) = app.connect("bob").await;

    app.hub().unregister(conn.clone()).await;
    app.hub().unregister(conn.clone()).await;

    assert!(!app.hub().contains(conn.id()));
    assert!(app.hub().contains(other.id()));
    assert!(!app.hub().is_user_online("alice").await);
    assert!(app.hub().is_user_online("bob").await);
}
