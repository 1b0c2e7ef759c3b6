// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The chat service.
//!
//! The send-side rate limit is derived from the store (the author's most recent message), so
//! it survives process restarts. The `chat.message` broadcast is viewer-agnostic and reaches
//! every subscriber, the author included.

use time::Duration;

use rally_hub::Hub;
use rally_model::{dto::MessageDto, EventId, Message, MessageId, UserId};
use rally_storage::Store;

use crate::{
    error::Error,
    policy::{Action, Viewer},
};

const TEXT_MAX: usize = 4000;
/// Minimum pause between two messages of one author within one event.
const SEND_RATE_LIMIT: Duration = Duration::milliseconds(800);

/// Default page size of the message listing.
pub const DEFAULT_PAGE_SIZE: usize = 30;
/// Maximum page size of the message listing.
pub const MAX_PAGE_SIZE: usize = 100;

/// Cursor filters of the message listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCursor {
    /// Serve the page immediately preceding this id.
    pub before_id: Option<MessageId>,
    /// Serve messages after this id.
    pub after_id: Option<MessageId>,
    /// Requested page size; clamped to [`MAX_PAGE_SIZE`].
    pub page_size: Option<usize>,
}

/// The chat service.
#[derive(Clone)]
pub struct ChatService {
    store: Store,
    hub: Hub,
}

fn validate_text(text: &str) -> Result<String, Error> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::validation("text", "The message must not be empty."));
    }
    if text.chars().count() > TEXT_MAX {
        return Err(Error::validation("text", "The message is too long."));
    }
    Ok(text.to_string())
}

impl ChatService {
    /// Creates the service.
    pub fn new(store: Store, hub: Hub) -> Self {
        Self { store, hub }
    }

    /// Sends a message into the event chat; participant-gated, rate limited per author.
    pub async fn send(&self, event: EventId, author: UserId, text: &str) -> Result<MessageDto, Error> {
        let text = validate_text(text)?;
        let now = rally_common::time::now_utc();

        let dto = self
            .store
            .transaction_and(
                |tables| {
                    Viewer::resolve(tables, event, author)?.require(Action::View)?;

                    if let Some(last) = tables.last_message_of_author(event, author) {
                        if now - last.created_at < SEND_RATE_LIMIT {
                            return Err(Error::RateLimited);
                        }
                    }

                    let id = tables.messages.next_id();
                    tables.messages.insert(
                        id,
                        Message {
                            id,
                            event,
                            author,
                            text: text.clone(),
                            created_at: now,
                            edited_at: None,
                        },
                    );

                    let author_row = tables.users.get(author).ok_or(Error::Unauthorized)?;
                    Ok(MessageDto::from_message(tables.messages.get(id).expect("just inserted"), author_row))
                },
                // Chat deliberately has no self-echo suppression; the author sees it too.
                |dto| {
                    self.hub.publish(
                        event,
                        "chat.message",
                        serde_json::to_value(dto).unwrap_or_else(|_| serde_json::json!({})),
                        None,
                    );
                },
            )
            .await?;
        Ok(dto)
    }

    /// Lists messages chronologically with cursor filters; participant-gated.
    pub async fn list(&self, event: EventId, user: UserId, cursor: MessageCursor) -> Result<Vec<MessageDto>, Error> {
        let page_size = cursor.page_size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE).max(1);

        self.store
            .view(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::View)?;

                let ordered = tables.messages_of_event(event);
                let selected: Vec<&Message> = if let Some(before) = cursor.before_id {
                    // The page immediately preceding the cursor, emitted chronologically.
                    let preceding: Vec<&Message> = ordered.into_iter().filter(|m| m.id < before).collect();
                    let skip = preceding.len().saturating_sub(page_size);
                    preceding.into_iter().skip(skip).collect()
                } else if let Some(after) = cursor.after_id {
                    ordered.into_iter().filter(|m| m.id > after).take(page_size).collect()
                } else {
                    ordered.into_iter().take(page_size).collect()
                };

                Ok(selected
                    .into_iter()
                    .filter_map(|m| tables.users.get(m.author).map(|u| MessageDto::from_message(m, u)))
                    .collect())
            })
            .await
    }

    /// Edits a message; author-only.
    pub async fn edit(&self, message: MessageId, user: UserId, text: &str) -> Result<MessageDto, Error> {
        let text = validate_text(text)?;
        let now = rally_common::time::now_utc();

        self.store
            .transaction(|tables| {
                let row = tables.messages.get(message).ok_or_else(|| Error::not_found("message"))?;
                if row.author != user {
                    return Err(Error::forbidden());
                }

                let row = tables.messages.get_mut(message).expect("resolved above");
                row.text = text.clone();
                row.edited_at = Some(now);

                let row = tables.messages.get(message).expect("resolved above");
                let author_row = tables.users.get(row.author).ok_or(Error::Unauthorized)?;
                Ok(MessageDto::from_message(row, author_row))
            })
            .await
    }

    /// Deletes a message; allowed for the author and for organizers of the event.
    ///
    /// No broadcast goes out; clients tolerate ids disappearing on refresh.
    pub async fn delete(&self, message: MessageId, user: UserId) -> Result<(), Error> {
        self.store
            .transaction(|tables| {
                let row = tables.messages.get(message).ok_or_else(|| Error::not_found("message"))?;
                let viewer = Viewer::resolve(tables, row.event, user)?;
                if row.author != user && !viewer.is_organizer() {
                    return Err(Error::forbidden());
                }
                tables.messages.remove(message);
                Ok(())
            })
            .await
    }
}
