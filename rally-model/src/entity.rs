// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The persisted entities and their intrinsic predicates.
//!
//! These types mirror the rows of the transactional store. Invariants that span rows (compact
//! orders, the last-organizer guard, vote uniqueness) are enforced by the services and the store;
//! predicates that depend only on one row live here.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use std::collections::BTreeSet;

use crate::ids::{
    EventId, InviteId, MessageId, ParticipantId, PollId, PollOptionId, TaskId, TaskListId, UserId, VoteId,
};

/// A registered account. Inactive users cannot authenticate, neither for HTTP nor for the
/// WebSocket handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Identifier.
    pub id: UserId,
    /// Unique, stored lowercased.
    pub email: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Optional avatar location.
    pub avatar_url: Option<String>,
    /// Whether the account has been confirmed.
    pub is_active: bool,
    /// Staff flag.
    pub is_staff: bool,
    /// Superuser flag.
    pub is_superuser: bool,
    /// Opt-in for email notifications.
    pub email_notifications_enabled: bool,
    /// Argon2 hash of the password.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: Vec<u8>,
    /// Salt the password was hashed with.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_salt: Vec<u8>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Returns the name shown to other participants: display name, falling back to the email.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}

/// A group workspace with a board, polls, chat and invites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Identifier.
    pub id: EventId,
    /// Owning user; materialized as organizer on creation.
    pub owner: UserId,
    /// Title.
    pub title: String,
    /// Free-form category.
    pub category: String,
    /// Free-form description.
    pub description: String,
    /// Free-form location.
    pub location: String,
    /// Optional start of the time range.
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    /// Optional end of the time range; `end_at >= start_at` when both are present.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Role of a participant within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control over the event, including participant management.
    Organizer,
    /// Regular member.
    Member,
}

/// A user attached to an event with a role. Unique per `(user, event)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Identifier.
    pub id: ParticipantId,
    /// The attached user.
    pub user: UserId,
    /// The event.
    pub event: EventId,
    /// Role within the event.
    pub role: Role,
    /// Join timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Derived state of an invite at a given point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    /// Usable.
    Ok,
    /// `expires_at` has passed.
    Expired,
    /// Revoked by the owner.
    Revoked,
    /// `max_uses` reached.
    Exhausted,
    /// Unknown token.
    NotFound,
}

/// An invitation token for joining an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    /// Identifier.
    pub id: InviteId,
    /// The event the invite admits to.
    pub event: EventId,
    /// Opaque, URL-safe, unique token.
    pub token: String,
    /// Creating user.
    pub created_by: UserId,
    /// Expiry timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Maximum number of uses; 0 means unlimited.
    pub max_uses: u32,
    /// Number of accepted uses; only ever increases, under row lock.
    pub uses_count: u32,
    /// Revocation flag.
    pub is_revoked: bool,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Invite {
    /// Derives the invite status at time `now`.
    pub fn status(&self, now: OffsetDateTime) -> InviteStatus {
        if self.is_revoked {
            InviteStatus::Revoked
        } else if self.expires_at <= now {
            InviteStatus::Expired
        } else if self.max_uses != 0 && self.uses_count >= self.max_uses {
            InviteStatus::Exhausted
        } else {
            InviteStatus::Ok
        }
    }

    /// Remaining uses, or `None` for unlimited invites.
    pub fn uses_left(&self) -> Option<u32> {
        if self.max_uses == 0 {
            None
        } else {
            Some(self.max_uses.saturating_sub(self.uses_count))
        }
    }
}

/// A column of the Kanban board. Orders are compact (`0..N-1`) within an event after every
/// committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    /// Identifier.
    pub id: TaskListId,
    /// Owning event.
    pub event: EventId,
    /// Title.
    pub title: String,
    /// Position within the event.
    pub order: i64,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// In progress.
    Doing,
    /// Completed.
    Done,
}

/// A task on the board. Orders are compact within the owning list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Identifier.
    pub id: TaskId,
    /// Owning list.
    pub list: TaskListId,
    /// Title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Status; moving to `doing`/`done` requires every dependency to be `done`.
    pub status: TaskStatus,
    /// Optional assignee; a participant of the same event.
    pub assignee: Option<ParticipantId>,
    /// Optional start timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    /// Optional deadline; `due_at >= start_at` when both are present.
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_at: Option<OffsetDateTime>,
    /// When the last deadline reminder went out.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deadline_reminder_sent_at: Option<OffsetDateTime>,
    /// The `due_at` the last reminder was for; together with the timestamp above this is the
    /// reminder idempotency key.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deadline_reminder_for_due_at: Option<OffsetDateTime>,
    /// Position within the list.
    pub order: i64,
    /// Tasks this task depends on; all within the same event.
    pub depends_on: BTreeSet<TaskId>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Kind of a poll; decides how options are labeled and deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollKind {
    /// Options are calendar dates, unique per poll.
    Date,
    /// Options are labeled places, unique per poll.
    Place,
    /// Options are free-form labels, unique per poll.
    Custom,
}

/// A poll within an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    /// Identifier.
    pub id: PollId,
    /// Owning event.
    pub event: EventId,
    /// Creating user.
    pub created_by: UserId,
    /// Kind of the poll.
    pub kind: PollKind,
    /// The question put to the participants.
    pub question: String,
    /// Whether a voter may pick several options.
    pub multiple: bool,
    /// Whether a voter may change an already cast vote.
    pub allow_change_vote: bool,
    /// Manual close flag.
    pub is_closed: bool,
    /// Optional automatic close timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    /// When the closing summary went out.
    #[serde(with = "time::serde::rfc3339::option")]
    pub closing_notification_sent_at: Option<OffsetDateTime>,
    /// The `end_at` the closing summary was for.
    #[serde(with = "time::serde::rfc3339::option")]
    pub closing_notification_for_end_at: Option<OffsetDateTime>,
    /// Monotonically increasing version; bumped on every observable change.
    pub version: u32,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Poll {
    /// Whether `end_at` has passed at time `now`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        matches!(self.end_at, Some(end_at) if end_at <= now)
    }

    /// A poll accepts votes iff it is neither manually closed nor expired.
    pub fn is_voting_closed(&self, now: OffsetDateTime) -> bool {
        self.is_closed || self.is_expired(now)
    }
}

/// An option of a poll. Either `label` (place/custom polls) or `date_value` (date polls) is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    /// Identifier.
    pub id: PollOptionId,
    /// Owning poll.
    pub poll: PollId,
    /// Label, unique and non-empty for place/custom polls.
    pub label: Option<String>,
    /// Calendar date, unique for date polls.
    pub date_value: Option<Date>,
}

/// A vote cast by a user; unique per `(poll, user, option)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Identifier.
    pub id: VoteId,
    /// The poll.
    pub poll: PollId,
    /// The chosen option.
    pub option: PollOptionId,
    /// The voter.
    pub user: UserId,
    /// Cast timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A chat message within an event. Ordered by `(created_at, id)` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Identifier.
    pub id: MessageId,
    /// Owning event.
    pub event: EventId,
    /// Authoring user.
    pub author: UserId,
    /// Message body.
    pub text: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the author last edited the message.
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use time::macros::datetime;

    fn invite(max_uses: u32, uses_count: u32, is_revoked: bool, expires_at: OffsetDateTime) -> Invite {
        Invite {
            id: InviteId(1),
            event: EventId(1),
            token: "token".to_string(),
            created_by: UserId(1),
            expires_at,
            max_uses,
            uses_count,
            is_revoked,
            created_at: datetime!(2023-01-01 00:00:00 UTC),
            updated_at: datetime!(2023-01-01 00:00:00 UTC),
        }
    }

    #[test]
    fn invite_status_precedence() {
        let now = datetime!(2023-06-01 12:00:00 UTC);
        let past = datetime!(2023-05-01 12:00:00 UTC);
        let future = datetime!(2023-07-01 12:00:00 UTC);

        // Revoked wins over everything else.
        assert_eq!(invite(1, 1, true, past).status(now), InviteStatus::Revoked);
        assert_eq!(invite(0, 0, false, past).status(now), InviteStatus::Expired);
        assert_eq!(invite(1, 1, false, future).status(now), InviteStatus::Exhausted);
        assert_eq!(invite(0, 100, false, future).status(now), InviteStatus::Ok);
    }

    #[test]
    fn invite_uses_left() {
        let future = datetime!(2023-07-01 12:00:00 UTC);

        assert_eq!(invite(0, 3, false, future).uses_left(), None);
        assert_eq!(invite(5, 3, false, future).uses_left(), Some(2));
        assert_eq!(invite(3, 5, false, future).uses_left(), Some(0));
    }

    #[test]
    fn voting_closed_by_flag_or_expiry() {
        let now = datetime!(2023-06-01 12:00:00 UTC);
        let poll = Poll {
            id: PollId(1),
            event: EventId(1),
            created_by: UserId(1),
            kind: PollKind::Custom,
            question: "where to?".to_string(),
            multiple: false,
            allow_change_vote: true,
            is_closed: false,
            end_at: None,
            closing_notification_sent_at: None,
            closing_notification_for_end_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        assert!(!poll.is_voting_closed(now));
        assert!(Poll { is_closed: true, ..poll.clone() }.is_voting_closed(now));
        assert!(
            Poll {
                end_at: Some(datetime!(2023-06-01 11:00:00 UTC)),
                ..poll.clone()
            }
            .is_voting_closed(now)
        );
        assert!(
            !Poll {
                end_at: Some(datetime!(2023-06-01 13:00:00 UTC)),
                ..poll
            }
            .is_voting_closed(now)
        );
    }
}
