// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{backend, join, next_broadcast, seed_event, seed_user};

use rally_model::{MessageId, Role};
use rally_service::{chat::MessageCursor, Error};

#[tokio::test]
async fn send_broadcasts_a_viewer_agnostic_message() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;

    let mut sub = backend.hub.subscribe(event);
    let sent = backend.chat.send(event, owner, "  hi  ").await.unwrap();
    assert_eq!(sent.text, "hi");
    assert_eq!(sent.author_name, "Owner");

    let broadcast = next_broadcast(&mut sub).await;
    assert_eq!(broadcast.message_type, "chat.message");
    assert_eq!(broadcast.payload["text"], "hi");
    assert_eq!(broadcast.payload["author"], owner.0);
    // No viewer-specific fields and no typing-style sender suppression.
    assert!(broadcast.payload.get("is_me").is_none());
    assert!(broadcast.sender_id.is_none());
}

#[tokio::test]
async fn send_validates_text() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    assert!(matches!(
        backend.chat.send(event, owner, "   ").await,
        Err(Error::Validation { .. })
    ));
    let long = "x".repeat(4001);
    assert!(matches!(
        backend.chat.send(event, owner, &long).await,
        Err(Error::Validation { .. })
    ));
}

#[tokio::test]
async fn sending_is_rate_limited_per_author() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;

    backend.chat.send(event, owner, "first").await.unwrap();
    assert!(matches!(
        backend.chat.send(event, owner, "too fast").await,
        Err(Error::RateLimited)
    ));
    // The limit is per author; another participant is unaffected.
    assert!(backend.chat.send(event, member, "fine").await.is_ok());
}

#[tokio::test]
async fn non_participants_cannot_chat() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let stranger = seed_user(&backend, "stranger@example.com", "Stranger").await;
    let event = seed_event(&backend, owner, "offsite").await;

    assert!(matches!(
        backend.chat.send(event, stranger, "hello?").await,
        Err(Error::Forbidden { .. })
    ));
    assert!(matches!(
        backend.chat.list(event, stranger, MessageCursor::default()).await,
        Err(Error::Forbidden { .. })
    ));
}

#[tokio::test]
async fn listing_is_chronological_with_cursors() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;

    // Seed rows directly; the send-side rate limit is covered elsewhere.
    backend
        .store
        .transaction::<_, ()>(move |tables| {
            let base = rally_common::time::now_utc();
            for i in 0..6i64 {
                let author = if i % 2 == 0 { owner } else { member };
                let id = tables.messages.next_id();
                tables.messages.insert(
                    id,
                    rally_model::Message {
                        id,
                        event,
                        author,
                        text: format!("msg {}", i),
                        created_at: base + time::Duration::seconds(i),
                        edited_at: None,
                    },
                );
            }
            Ok(())
        })
        .await
        .unwrap();

    let all = backend.chat.list(event, owner, MessageCursor::default()).await.unwrap();
    assert_eq!(all.len(), 6);
    let texts: Vec<&str> = all.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4", "msg 5"]);

    // `after_id` pages forward.
    let after = backend
        .chat
        .list(
            event,
            owner,
            MessageCursor {
                after_id: Some(all[2].id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(after.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), vec![
        "msg 3", "msg 4", "msg 5"
    ]);

    // `before_id` serves the page immediately preceding the cursor, still chronological.
    let before = backend
        .chat
        .list(
            event,
            owner,
            MessageCursor {
                before_id: Some(all[4].id),
                page_size: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(before.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), vec![
        "msg 2", "msg 3"
    ]);
}

#[tokio::test]
async fn edit_is_author_only_and_stamps_edited_at() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;

    let sent = backend.chat.send(event, member, "tpyo").await.unwrap();
    assert!(sent.edited_at.is_none());

    assert!(matches!(
        backend.chat.edit(sent.id, owner, "nope").await,
        Err(Error::Forbidden { .. })
    ));

    let edited = backend.chat.edit(sent.id, member, "typo").await.unwrap();
    assert_eq!(edited.text, "typo");
    assert!(edited.edited_at.is_some());
}

#[tokio::test]
async fn delete_is_author_or_organizer() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let other = seed_user(&backend, "other@example.com", "Other").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;
    join(&backend, event, other, Role::Member).await;

    let first = backend.chat.send(event, member, "mine").await.unwrap();
    // Another member may not delete it.
    assert!(matches!(
        backend.chat.delete(first.id, other).await,
        Err(Error::Forbidden { .. })
    ));
    // The author may.
    backend.chat.delete(first.id, member).await.unwrap();

    let second = backend.chat.send(event, other, "theirs").await.unwrap();
    // Organizers may delete anything in their event.
    backend.chat.delete(second.id, owner).await.unwrap();

    assert!(matches!(
        backend.chat.delete(MessageId(999), owner).await,
        Err(Error::NotFound { .. })
    ));
}
