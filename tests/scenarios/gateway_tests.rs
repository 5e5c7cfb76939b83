//! Connections driven end to end over in-process transports.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use chat_hub::presentation::websocket::{
    channel_transport, Connection, ConnectionConfig, ConnectionInfo, DisconnectReason, Hub,
    RemotePeer, WireFrame,
};

use crate::common::TestHub;

fn spawn_connection(
    app: &TestHub,
    user_id: i64,
    shutdown: watch::Receiver<bool>,
) -> (JoinHandle<DisconnectReason>, RemotePeer) {
    let (sink, stream, peer) = channel_transport(32);
    let task = tokio::spawn(Connection::serve(
        app.hub.clone(),
        app.repos.channels.clone(),
        user_id,
        ConnectionInfo::default(),
        ConnectionConfig::default(),
        sink,
        stream,
        shutdown,
    ));
    (task, peer)
}

/// Next frame of the given type, skipping everything else.
async fn next_of_type(peer: &mut RemotePeer, event_type: &str) -> Value {
    timeout(Duration::from_secs(5), async {
        loop {
            let text = peer.recv_text().await.expect("connection open");
            let frame: Value = serde_json::from_str(&text).expect("frame is JSON");
            if frame["type"] == event_type {
                return frame;
            }
        }
    })
    .await
    .expect("frame arrives in time")
}

async fn wait_for_subscribers(hub: &Hub, channel_id: i64, count: usize) {
    timeout(Duration::from_secs(5), async {
        while hub.subscriber_count(channel_id) < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("subscriptions land in time");
}

#[tokio::test]
async fn test_gateway_delivers_channel_traffic() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let (stop, shutdown) = watch::channel(false);

    let (alice_task, mut alice) = spawn_connection(&app, 1, shutdown.clone());
    let (bob_task, mut bob) = spawn_connection(&app, 2, shutdown);

    for peer in [&alice, &bob] {
        peer.send_text(r#"{"type":"subscribe","data":{"channelId":7}}"#)
            .await;
    }
    wait_for_subscribers(&app.hub, 7, 2).await;

    let sent = app.send(7, 1, "over the wire").await;
    for peer in [&mut alice, &mut bob] {
        let frame = next_of_type(peer, "message_created").await;
        assert_eq!(frame["channelId"], 7);
        assert_eq!(frame["data"]["message"]["id"], sent.id);
    }

    bob.send_text(r#"{"type":"typing","data":{"channelId":7}}"#)
        .await;
    let typing = next_of_type(&mut alice, "typing").await;
    assert_eq!(typing["data"]["userId"], 2);
    assert_eq!(typing["data"]["typing"], true);

    bob.outgoing.send(Ok(WireFrame::Close)).await.unwrap();
    assert_eq!(bob_task.await.unwrap(), DisconnectReason::ClientClosed);
    let offline = next_of_type(&mut alice, "presence").await;
    assert_eq!(offline["data"]["userId"], 2);
    assert_eq!(offline["data"]["status"], "offline");

    stop.send(true).unwrap();
    assert_eq!(alice_task.await.unwrap(), DisconnectReason::Shutdown);
    assert_eq!(app.hub.client_count(), 0);
    assert_eq!(app.hub.subscriber_count(7), 0);
}

#[tokio::test]
async fn test_unsubscribed_connection_misses_channel_traffic() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let (stop, shutdown) = watch::channel(false);
    let (task, mut peer) = spawn_connection(&app, 2, shutdown);

    peer.send_text(r#"{"type":"subscribe","data":{"channelId":7}}"#)
        .await;
    wait_for_subscribers(&app.hub, 7, 1).await;
    peer.send_text(r#"{"type":"unsubscribe","data":{"channelId":7}}"#)
        .await;
    timeout(Duration::from_secs(5), async {
        while app.hub.subscriber_count(7) > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    app.send(7, 1, "nobody listening").await;
    stop.send(true).unwrap();
    assert_eq!(task.await.unwrap(), DisconnectReason::Shutdown);

    let mut types = Vec::new();
    while let Some(text) = peer.recv_text().await {
        let frame: Value = serde_json::from_str(&text).unwrap();
        types.push(frame["type"].as_str().unwrap_or_default().to_string());
    }
    assert!(!types.contains(&"message_created".to_string()));
}

#[tokio::test]
async fn test_gateway_refuses_subscribe_from_non_member() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let (stop, shutdown) = watch::channel(false);
    let (task, mut outsider) = spawn_connection(&app, 3, shutdown);

    outsider
        .send_text(r#"{"type":"subscribe","data":{"channelId":7}}"#)
        .await;
    let error = next_of_type(&mut outsider, "error").await;
    assert_eq!(error["code"], 10003);
    assert_eq!(app.hub.subscriber_count(7), 0);

    app.send(7, 1, "members only").await;
    stop.send(true).unwrap();
    assert_eq!(task.await.unwrap(), DisconnectReason::Shutdown);

    while let Some(text) = outsider.recv_text().await {
        let frame: Value = serde_json::from_str(&text).unwrap();
        assert_ne!(frame["type"], "message_created");
    }
}

#[tokio::test]
async fn test_gateway_drops_typing_and_receipts_for_unsubscribed_channel() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let sent = app.send(7, 1, "read me").await;
    let (stop, shutdown) = watch::channel(false);
    let (alice_task, mut alice) = spawn_connection(&app, 1, shutdown.clone());
    let (bob_task, bob) = spawn_connection(&app, 2, shutdown);

    alice
        .send_text(r#"{"type":"subscribe","data":{"channelId":7}}"#)
        .await;
    wait_for_subscribers(&app.hub, 7, 1).await;

    // Bob is a member but has not subscribed yet.
    bob.send_text(r#"{"type":"typing","data":{"channelId":7,"typing":false}}"#)
        .await;
    bob.send_text(format!(
        r#"{{"type":"read_receipt","data":{{"channelId":7,"messageId":{}}}}}"#,
        sent.id
    ))
    .await;
    bob.send_text(r#"{"type":"subscribe","data":{"channelId":7}}"#)
        .await;
    bob.send_text(r#"{"type":"typing","data":{"channelId":7,"typing":true}}"#)
        .await;

    let mut seen = Vec::new();
    let typing = timeout(Duration::from_secs(5), async {
        loop {
            let text = alice.recv_text().await.expect("connection open");
            let frame: Value = serde_json::from_str(&text).unwrap();
            if frame["type"] == "typing" {
                return frame;
            }
            seen.push(frame["type"].as_str().unwrap_or_default().to_string());
        }
    })
    .await
    .expect("typing relayed after subscribe");
    assert_eq!(typing["data"]["typing"], true);
    assert!(!seen.contains(&"read_receipt".to_string()));

    stop.send(true).unwrap();
    assert_eq!(alice_task.await.unwrap(), DisconnectReason::Shutdown);
    assert_eq!(bob_task.await.unwrap(), DisconnectReason::Shutdown);
}
