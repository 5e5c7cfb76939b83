//! Reads through the cache never observe data older than the last
//! confirmed write.

use pretty_assertions::assert_eq;

use chat_hub::application::services::SendMessageInput;
use chat_hub::domain::MessageRepository;
use chat_hub::infrastructure::cache::keys;
use chat_hub::shared::error::AppError;

use crate::common::TestHub;

#[tokio::test]
async fn test_edit_is_visible_through_warm_cache() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[]).await;
    let message = app.send(7, 1, "first").await;

    // Warm the entity and page keys.
    app.services.messages.get_message(message.id).await.unwrap();
    app.services
        .messages
        .get_channel_messages(7, None, None)
        .await
        .unwrap();
    assert!(app.cache.contains(&keys::message(message.id)));

    app.services
        .messages
        .edit_message(message.id, 1, "second".into())
        .await
        .unwrap();

    let fetched = app.services.messages.get_message(message.id).await.unwrap();
    assert_eq!(fetched.content, "second");
    assert!(fetched.edited_at.is_some());

    let page = app
        .services
        .messages
        .get_channel_messages(7, None, None)
        .await
        .unwrap();
    assert_eq!(page.messages[0].content, "second");
}

#[tokio::test]
async fn test_deleted_message_is_not_served_from_cache() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[]).await;
    let message = app.send(7, 1, "short lived").await;
    app.services.messages.get_message(message.id).await.unwrap();

    app.services
        .messages
        .delete_message(message.id, 1)
        .await
        .unwrap();

    assert!(!app.cache.contains(&keys::message(message.id)));
    let err = app
        .services
        .messages
        .get_message(message.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let page = app
        .services
        .messages
        .get_channel_messages(7, None, None)
        .await
        .unwrap();
    assert!(page.messages.is_empty());
}

#[tokio::test]
async fn test_failed_write_keeps_cached_entry() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let message = app.send(7, 1, "mine").await;
    app.services.messages.get_message(message.id).await.unwrap();

    // Not the sender: rejected before any write, cache untouched.
    let err = app
        .services
        .messages
        .edit_message(message.id, 2, "hijack".into())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
    assert!(app.cache.contains(&keys::message(message.id)));
    assert_eq!(
        app.durable.find_by_id(message.id).await.unwrap().unwrap().content,
        "mine"
    );
}

#[tokio::test]
async fn test_deleting_thread_root_drops_cached_replies() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let root = app.send(7, 1, "root").await;
    let reply = app
        .services
        .messages
        .send_message(SendMessageInput {
            channel_id: 7,
            sender_id: 2,
            content: "in thread".into(),
            thread_id: Some(root.id),
            ..Default::default()
        })
        .await
        .unwrap();

    app.services.messages.get_message(reply.id).await.unwrap();
    app.services
        .messages
        .get_thread_messages(root.id)
        .await
        .unwrap();
    assert!(app.cache.contains(&keys::message(reply.id)));

    app.services.messages.delete_message(root.id, 1).await.unwrap();

    assert!(app.durable.find_by_id(reply.id).await.unwrap().is_none());
    assert!(!app.cache.contains(&keys::thread_messages(root.id)));
    let err = app
        .services
        .messages
        .get_message(reply.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_deleting_reply_target_refreshes_cached_reply() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let target = app.send(7, 1, "original").await;
    let answer = app
        .services
        .messages
        .send_message(SendMessageInput {
            channel_id: 7,
            sender_id: 2,
            content: "answer".into(),
            reply_to_id: Some(target.id),
            ..Default::default()
        })
        .await
        .unwrap();

    let warmed = app.services.messages.get_message(answer.id).await.unwrap();
    assert_eq!(warmed.reply_to_id, Some(target.id));

    app.services
        .messages
        .delete_message(target.id, 1)
        .await
        .unwrap();

    let fetched = app.services.messages.get_message(answer.id).await.unwrap();
    assert_eq!(fetched.reply_to_id, None);
    assert_eq!(fetched.content, "answer");
}
