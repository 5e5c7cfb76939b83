//! Use-case rules exercised through the fully wired service set.

use pretty_assertions::assert_eq;

use chat_hub::application::services::{SearchInput, UploadAttachmentInput};
use chat_hub::domain::MAX_PINNED_MESSAGES;
use chat_hub::shared::error::AppError;

use crate::common::{drain, types, TestHub};

#[tokio::test]
async fn test_pin_cap_holds_at_fifty() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[]).await;

    let mut ids = Vec::new();
    for n in 0..=MAX_PINNED_MESSAGES {
        ids.push(app.send(7, 1, &format!("pin me {}", n)).await.id);
    }
    for id in &ids[..MAX_PINNED_MESSAGES] {
        app.services.pins.pin_message(*id, 1).await.unwrap();
    }

    let err = app
        .services
        .pins
        .pin_message(ids[MAX_PINNED_MESSAGES], 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PinLimitExceeded { limit: 50 }));

    let pinned = app.services.pins.get_pinned_messages(7).await.unwrap();
    assert_eq!(pinned.len(), MAX_PINNED_MESSAGES);
    let last = app
        .services
        .messages
        .get_message(ids[MAX_PINNED_MESSAGES])
        .await
        .unwrap();
    assert!(!last.pinned);

    // Unpinning frees a slot.
    app.services.pins.unpin_message(ids[0], 1).await.unwrap();
    app.services
        .pins
        .pin_message(ids[MAX_PINNED_MESSAGES], 1)
        .await
        .unwrap();
    assert_eq!(
        app.services.pins.get_pinned_messages(7).await.unwrap().len(),
        MAX_PINNED_MESSAGES
    );
}

#[tokio::test]
async fn test_read_receipts_once_per_reader_never_for_sender() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let message = app.send(7, 1, "read me").await;
    let (_a, mut a_rx) = app.connect(1, &[7]);

    assert!(!app.services.receipts.mark_as_read(message.id, 1).await.unwrap());
    assert!(app.services.receipts.mark_as_read(message.id, 2).await.unwrap());
    assert!(!app.services.receipts.mark_as_read(message.id, 2).await.unwrap());

    let receipts = app
        .services
        .receipts
        .get_message_read_receipts(message.id)
        .await
        .unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].user_id, 2);

    let frames = drain(&mut a_rx);
    assert_eq!(types(&frames), vec!["message_read"]);
    assert!(frames[0].get("channelId").is_none());
}

#[tokio::test]
async fn test_mark_channel_as_read_skips_own_and_already_read() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let first = app.send(7, 1, "one").await;
    app.send(7, 1, "two").await;
    app.send(7, 2, "mine").await;
    app.services.receipts.mark_as_read(first.id, 2).await.unwrap();

    let marked = app
        .services
        .receipts
        .mark_channel_as_read(7, 2)
        .await
        .unwrap();
    assert_eq!(marked, 1);
    assert_eq!(
        app.services.receipts.mark_channel_as_read(7, 2).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_search_pages_report_has_more() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[]).await;
    for n in 0..45 {
        app.send(7, 1, &format!("Needle {}", n)).await;
    }
    app.send(7, 1, "haystack").await;

    let page = |offset| SearchInput {
        channel_id: Some(7),
        query: Some("needle".into()),
        offset: Some(offset),
        ..Default::default()
    };

    let second = app.services.search.search_messages(page(20)).await.unwrap();
    assert_eq!(second.total, 45);
    assert_eq!(second.messages.len(), 20);
    assert!(second.has_more);

    let last = app.services.search.search_messages(page(40)).await.unwrap();
    assert_eq!(last.messages.len(), 5);
    assert!(!last.has_more);
}

#[tokio::test]
async fn test_upload_stores_file_and_records_attachment() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[]).await;
    let message = app.send(7, 1, "see attached").await;
    let (_a, mut a_rx) = app.connect(1, &[7]);

    let attachment = app
        .services
        .attachments
        .upload_attachment(UploadAttachmentInput {
            message_id: message.id,
            user_id: 1,
            filename: "photo.png".into(),
            content_type: "image/png".into(),
            data: vec![0x89, b'P', b'N', b'G'],
        })
        .await
        .unwrap();

    assert!(attachment.is_image);
    assert_eq!(attachment.size, 4);
    assert!(attachment.url.starts_with("http://files.test/"));
    let relative = attachment.url.trim_start_matches("http://files.test/");
    assert!(app.storage_root.join(relative).exists());

    assert_eq!(
        app.services
            .attachments
            .get_attachments(message.id)
            .await
            .unwrap(),
        vec![attachment]
    );
    assert_eq!(types(&drain(&mut a_rx)), vec!["attachment_uploaded"]);
}

#[tokio::test]
async fn test_rejected_upload_leaves_nothing_behind() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[]).await;
    let message = app.send(7, 1, "no exe").await;

    let err = app
        .services
        .attachments
        .upload_attachment(UploadAttachmentInput {
            message_id: message.id,
            user_id: 1,
            filename: "tool.exe".into(),
            content_type: "application/octet-stream".into(),
            data: vec![1, 2, 3],
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(app
        .services
        .attachments
        .get_attachments(message.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_duplicate_reaction_conflicts_and_counts_stay() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let message = app.send(7, 1, "react").await;

    let reaction = app
        .services
        .reactions
        .add_reaction(message.id, 2, "🎉")
        .await
        .unwrap();
    let err = app
        .services
        .reactions
        .add_reaction(message.id, 2, "🎉")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let counts = app
        .services
        .reactions
        .get_reactions(message.id, 2)
        .await
        .unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].count, 1);
    assert!(counts[0].me);

    app.services
        .reactions
        .remove_reaction(reaction.id, 2)
        .await
        .unwrap();
    assert!(app
        .services
        .reactions
        .get_reactions(message.id, 2)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_threads_and_deletion_cascade_listing() {
    let app = TestHub::new().await;
    app.channel(7, 1, &[2]).await;
    let root = app.send(7, 1, "root").await;
    let reply = app
        .services
        .messages
        .send_message(chat_hub::application::services::SendMessageInput {
            channel_id: 7,
            sender_id: 2,
            content: "reply".into(),
            thread_id: Some(root.id),
            ..Default::default()
        })
        .await
        .unwrap();

    let thread = app
        .services
        .messages
        .get_thread_messages(root.id)
        .await
        .unwrap();
    assert_eq!(thread, vec![reply.clone()]);

    app.services
        .messages
        .delete_message(reply.id, 2)
        .await
        .unwrap();
    assert!(app
        .services
        .messages
        .get_thread_messages(root.id)
        .await
        .unwrap()
        .is_empty());
}
