//! Hub fan-out through the use-case layer.

use pretty_assertions::assert_eq;
use serde_json::json;

use chat_hub::presentation::websocket::{BroadcastMessage, ClientHandle, ConnectionInfo};

use crate::common::{drain, types, TestHub};

#[tokio::test]
async fn test_message_reaches_every_channel_subscriber_only() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;

    let (_a, mut a_rx) = app.connect(1, &[7]);
    let (_b, mut b_rx) = app.connect(2, &[7]);
    let (_c, mut c_rx) = app.connect(3, &[8]);
    // Presence of later registrations.
    drain(&mut a_rx);
    drain(&mut b_rx);

    let message = app.send(7, 1, "hello channel").await;

    for rx in [&mut a_rx, &mut b_rx] {
        let frames = drain(rx);
        assert_eq!(types(&frames), vec!["message_created"]);
        assert_eq!(frames[0]["channelId"], 7);
        assert_eq!(frames[0]["data"]["message"]["content"], "hello channel");
        assert_eq!(frames[0]["data"]["message"]["id"], json!(message.id));
    }
    assert!(drain(&mut c_rx).is_empty());
}

#[tokio::test]
async fn test_unregister_twice_is_a_no_op() {
    let app = TestHub::new().await;
    let (id, _rx) = app.connect(1, &[7]);
    let (_other, mut other_rx) = app.connect(2, &[7]);

    assert!(app.hub.unregister(id));
    assert!(!app.hub.unregister(id));

    let frames = drain(&mut other_rx);
    assert_eq!(types(&frames), vec!["presence"]);
    assert_eq!(frames[0]["data"]["status"], "offline");
    assert_eq!(app.hub.client_count(), 1);
    assert_eq!(app.hub.subscriber_count(7), 1);
}

#[tokio::test]
async fn test_slow_client_is_evicted_and_others_keep_receiving() {
    let app = TestHub::new().await;
    let (_fast, mut fast_rx) = app.connect(1, &[7]);

    let (slow, mut slow_rx) = ClientHandle::new(2, ConnectionInfo::default(), 1);
    let slow_id = slow.id;
    app.hub.register(slow);
    app.hub.subscribe(slow_id, 7);
    drain(&mut slow_rx);
    drain(&mut fast_rx);

    let first = app
        .hub
        .broadcast(&BroadcastMessage::new("message_created", 7, json!({"n": 1})));
    assert_eq!(first.delivered, 2);
    assert!(first.evicted.is_empty());

    let second = app
        .hub
        .broadcast(&BroadcastMessage::new("message_created", 7, json!({"n": 2})));
    assert_eq!(second.delivered, 1);
    assert_eq!(second.evicted, vec![slow_id]);

    assert_eq!(app.hub.client_count(), 1);
    assert!(!app.hub.is_subscribed(slow_id, 7));
    assert_eq!(
        types(&drain(&mut fast_rx)),
        vec!["message_created", "message_created", "presence"]
    );

    // The evicted client's buffer is closed after what it already held.
    assert!(slow_rx.recv().await.is_some());
    assert!(slow_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_reaction_and_pin_events_are_broadcast() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let (_a, mut a_rx) = app.connect(1, &[7]);
    let message = app.send(7, 1, "react to me").await;
    drain(&mut a_rx);

    app.services
        .reactions
        .add_reaction(message.id, 2, "👍")
        .await
        .unwrap();
    app.services.pins.pin_message(message.id, 1).await.unwrap();

    assert_eq!(
        types(&drain(&mut a_rx)),
        vec!["reaction_added", "message_pinned"]
    );
}
