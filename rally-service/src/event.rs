// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Event CRUD.
//!
//! Creating an event materializes its owner as organizer, which seeds the last-organizer
//! invariant every later participant mutation preserves. Deleting an event cascades over all
//! owned children.

use time::OffsetDateTime;

use rally_model::{dto::EventDto, Event, EventId, Participant, Role, UserId};
use rally_storage::Store;

use crate::{
    error::Error,
    policy::{Action, Viewer},
};

const TITLE_MAX: usize = 200;

/// Input of event creation.
#[derive(Debug, Clone)]
pub struct EventInput {
    /// Title, 1..=200 chars after trimming.
    pub title: String,
    /// Category.
    pub category: String,
    /// Description.
    pub description: String,
    /// Location.
    pub location: String,
    /// Optional start of the time range.
    pub start_at: Option<OffsetDateTime>,
    /// Optional end of the time range.
    pub end_at: Option<OffsetDateTime>,
}

/// Partial update of an event; `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
    /// New title.
    pub title: Option<String>,
    /// New category.
    pub category: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New location.
    pub location: Option<String>,
    /// New start of the time range.
    pub start_at: Option<Option<OffsetDateTime>>,
    /// New end of the time range.
    pub end_at: Option<Option<OffsetDateTime>>,
}

/// The events service.
#[derive(Clone)]
pub struct EventService {
    store: Store,
}

fn validate_title(title: &str) -> Result<String, Error> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::validation("title", "Title must not be empty."));
    }
    if title.chars().count() > TITLE_MAX {
        return Err(Error::validation("title", "Title is too long."));
    }
    Ok(title.to_string())
}

fn validate_range(start_at: Option<OffsetDateTime>, end_at: Option<OffsetDateTime>) -> Result<(), Error> {
    if let (Some(start), Some(end)) = (start_at, end_at) {
        if end < start {
            return Err(Error::validation("end_at", "End must not precede start."));
        }
    }
    Ok(())
}

impl EventService {
    /// Creates the service.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates an event owned by `owner` and materializes the owner as organizer.
    pub async fn create(&self, owner: UserId, input: EventInput) -> Result<EventDto, Error> {
        let title = validate_title(&input.title)?;
        validate_range(input.start_at, input.end_at)?;
        let now = rally_common::time::now_utc();

        self.store
            .transaction(|tables| {
                if !tables.users.contains(owner) {
                    return Err(Error::Unauthorized);
                }
                let id = tables.events.next_id();
                tables.events.insert(
                    id,
                    Event {
                        id,
                        owner,
                        title: title.clone(),
                        category: input.category.clone(),
                        description: input.description.clone(),
                        location: input.location.clone(),
                        start_at: input.start_at,
                        end_at: input.end_at,
                        created_at: now,
                        updated_at: now,
                    },
                );
                let participant_id = tables.participants.next_id();
                tables.participants.insert(
                    participant_id,
                    Participant {
                        id: participant_id,
                        user: owner,
                        event: id,
                        role: Role::Organizer,
                        joined_at: now,
                    },
                );
                Ok(EventDto::from_event(tables.events.get(id).expect("just inserted")))
            })
            .await
    }

    /// Lists the events the user participates in, newest start first.
    pub async fn list_for_user(&self, user: UserId) -> Vec<EventDto> {
        self.store
            .view(|tables| {
                let mut events: Vec<&Event> = tables
                    .events
                    .values()
                    .filter(|e| tables.participant_of(e.id, user).is_some())
                    .collect();
                events.sort_by_key(|e| (std::cmp::Reverse(e.start_at), e.id));
                events.iter().map(|e| EventDto::from_event(e)).collect()
            })
            .await
    }

    /// Serves one event to a participant.
    pub async fn get(&self, event: EventId, user: UserId) -> Result<EventDto, Error> {
        self.store
            .view(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::View)?;
                Ok(EventDto::from_event(tables.events.get(event).expect("resolved above")))
            })
            .await
    }

    /// Applies a partial update; organizer-gated.
    pub async fn update(&self, event: EventId, user: UserId, update: EventUpdate) -> Result<EventDto, Error> {
        let title = update.title.as_deref().map(validate_title).transpose()?;
        let now = rally_common::time::now_utc();

        self.store
            .transaction(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::Organize)?;
                let row = tables.events.get_mut(event).ok_or_else(|| Error::not_found("event"))?;

                let start_at = update.start_at.unwrap_or(row.start_at);
                let end_at = update.end_at.unwrap_or(row.end_at);
                validate_range(start_at, end_at)?;

                if let Some(title) = title.clone() {
                    row.title = title;
                }
                if let Some(category) = update.category.clone() {
                    row.category = category;
                }
                if let Some(description) = update.description.clone() {
                    row.description = description;
                }
                if let Some(location) = update.location.clone() {
                    row.location = location;
                }
                row.start_at = start_at;
                row.end_at = end_at;
                row.updated_at = now;

                Ok(EventDto::from_event(row))
            })
            .await
    }

    /// Deletes an event with all owned children; owner-gated.
    pub async fn delete(&self, event: EventId, user: UserId) -> Result<(), Error> {
        self.store
            .transaction(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::Own)?;
                tables.delete_event(event);
                Ok(())
            })
            .await
    }
}
