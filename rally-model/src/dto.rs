// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Read-side DTOs for the HTTP surface and the broadcast payloads.
//!
//! Write-side inputs are separate request types owned by the REST crate; these types are what
//! leaves the backend. Viewer-specific fields (`my_votes`, `viewer_role`) live in wrapper types
//! so that broadcast payloads stay viewer-agnostic.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    entity::{Event, InviteStatus, Message, Participant, PollKind, Role, Task, TaskList, TaskStatus, User},
    ids::{EventId, InviteId, MessageId, ParticipantId, PollId, PollOptionId, TaskId, TaskListId, UserId},
};

/// Public reference to a user, embedded in rosters and message payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    /// Identifier.
    pub id: UserId,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Avatar location.
    pub avatar_url: Option<String>,
}

impl UserRef {
    /// Builds a reference from a user row.
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// Profile of the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDto {
    /// Identifier.
    pub id: UserId,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Avatar location.
    pub avatar_url: Option<String>,
    /// Opt-in for email notifications.
    pub email_notifications_enabled: bool,
}

impl ProfileDto {
    /// Builds the profile DTO from a user row.
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            email_notifications_enabled: user.email_notifications_enabled,
        }
    }
}

/// An event as returned by the events CRUD surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDto {
    /// Identifier.
    pub id: EventId,
    /// Owning user.
    pub owner: UserId,
    /// Title.
    pub title: String,
    /// Category.
    pub category: String,
    /// Description.
    pub description: String,
    /// Location.
    pub location: String,
    /// Start of the time range.
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    /// End of the time range.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl EventDto {
    /// Builds the DTO from an event row.
    pub fn from_event(event: &Event) -> Self {
        Self {
            id: event.id,
            owner: event.owner,
            title: event.title.clone(),
            category: event.category.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start_at: event.start_at,
            end_at: event.end_at,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

/// A participant with its embedded user reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDto {
    /// Identifier.
    pub id: ParticipantId,
    /// Role within the event.
    pub role: Role,
    /// The attached user.
    pub user: UserRef,
}

impl ParticipantDto {
    /// Builds the DTO from a participant row and its user.
    pub fn from_participant(participant: &Participant, user: &User) -> Self {
        Self {
            id: participant.id,
            role: participant.role,
            user: UserRef::from_user(user),
        }
    }
}

/// A task as broadcast in `task.created` / `task.updated` and served on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    /// Identifier.
    pub id: TaskId,
    /// Owning list.
    pub list: TaskListId,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Status.
    pub status: TaskStatus,
    /// Assignee.
    pub assignee: Option<ParticipantId>,
    /// Start timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    /// Deadline.
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_at: Option<OffsetDateTime>,
    /// Position within the list.
    pub order: i64,
    /// Dependency ids.
    pub depends_on: Vec<TaskId>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TaskDto {
    /// Builds the DTO from a task row.
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            list: task.list,
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            assignee: task.assignee,
            start_at: task.start_at,
            due_at: task.due_at,
            order: task.order,
            depends_on: task.depends_on.iter().copied().collect(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// A board column as broadcast in `tasklist.created` and served on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListDto {
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

impl TaskListDto {
    /// Builds the DTO from a task list row.
    pub fn from_task_list(list: &TaskList) -> Self {
        Self {
            id: list.id,
            event: list.event,
            title: list.title.clone(),
            order: list.order,
            created_at: list.created_at,
            updated_at: list.updated_at,
        }
    }
}

/// A board column together with its ordered tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardListDto {
    /// The column.
    #[serde(flatten)]
    pub list: TaskListDto,
    /// Tasks of the column, ordered by `(order, id)`.
    pub tasks: Vec<TaskDto>,
}

/// Reference to the event a board belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEventRef {
    /// Identifier.
    pub id: EventId,
    /// Title.
    pub title: String,
}

/// Full board snapshot of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardDto {
    /// The event.
    pub event: BoardEventRef,
    /// Ordered columns with their ordered tasks.
    pub lists: Vec<BoardListDto>,
    /// Roster of the event.
    pub participants: Vec<ParticipantDto>,
    /// Role of the viewer.
    pub viewer_role: Option<Role>,
    /// Whether the viewer is an organizer.
    pub is_owner: bool,
}

/// A poll option with its live tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOptionDto {
    /// Identifier.
    pub id: PollOptionId,
    /// Label for place/custom polls.
    pub label: Option<String>,
    /// Date for date polls.
    pub date_value: Option<Date>,
    /// Number of votes cast for this option.
    pub votes_count: u64,
}

/// A poll with derived tallies; viewer-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollDto {
    /// Identifier.
    pub id: PollId,
    /// Owning event.
    pub event: EventId,
    /// Kind of the poll.
    #[serde(rename = "type")]
    pub kind: PollKind,
    /// The question.
    pub question: String,
    /// Whether several options may be picked.
    pub multiple: bool,
    /// Whether a cast vote may be changed.
    pub allow_change_vote: bool,
    /// Manual close flag.
    pub is_closed: bool,
    /// Automatic close timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the poll state.
    pub version: u32,
    /// Options with their tallies, ordered by id.
    pub options: Vec<PollOptionDto>,
    /// Sum of all per-option tallies.
    pub total_votes: u64,
    /// Option ids tied at the strictly positive maximum tally; empty when nobody voted.
    pub leader_option_ids: Vec<PollOptionId>,
}

/// A poll as served to a specific viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollReadDto {
    /// The viewer-agnostic poll.
    #[serde(flatten)]
    pub poll: PollDto,
    /// Option ids the viewer has voted for.
    pub my_votes: Vec<PollOptionId>,
}

/// A chat message; viewer-agnostic (no `is_me`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    /// Identifier.
    pub id: MessageId,
    /// Owning event.
    pub event: EventId,
    /// Authoring user.
    pub author: UserId,
    /// Display name of the author.
    pub author_name: String,
    /// Avatar of the author.
    pub author_avatar: Option<String>,
    /// Body.
    pub text: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last edit timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
}

impl MessageDto {
    /// Builds the DTO from a message row and its author.
    pub fn from_message(message: &Message, author: &User) -> Self {
        Self {
            id: message.id,
            event: message.event,
            author: message.author,
            author_name: author.display_name().to_string(),
            author_avatar: author.avatar_url.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
            edited_at: message.edited_at,
        }
    }
}

/// An invite as returned to the event owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteDto {
    /// Identifier.
    pub id: InviteId,
    /// The event the invite admits to.
    pub event: EventId,
    /// The opaque token.
    pub token: String,
    /// Join URL constructed from the frontend base.
    pub invite_url: String,
    /// Expiry timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Maximum uses; 0 means unlimited.
    pub max_uses: u32,
    /// Accepted uses so far.
    pub uses_count: u32,
    /// Revocation flag.
    pub is_revoked: bool,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Minimal public event snippet exposed by invite validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnippet {
    /// Identifier.
    pub id: EventId,
    /// Title.
    pub title: String,
    /// Location.
    pub location: String,
    /// Start of the time range.
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
}

/// Result of a public invite validation; always served with HTTP 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteValidationDto {
    /// Derived status at validation time.
    pub status: InviteStatus,
    /// Public snippet of the event, absent for unknown tokens.
    pub event: Option<EventSnippet>,
    /// Remaining uses, absent for unlimited or unknown invites.
    pub uses_left: Option<u32>,
    /// Expiry, absent for unknown tokens.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl InviteValidationDto {
    /// The response for a missing or unknown token.
    pub fn not_found() -> Self {
        Self {
            status: InviteStatus::NotFound,
            event: None,
            uses_left: None,
            expires_at: None,
        }
    }
}

/// Per-list slice of the progress aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressListDto {
    /// The list.
    pub list_id: TaskListId,
    /// Title of the list.
    pub title: String,
    /// Number of tasks in the list.
    pub total: u64,
    /// Tasks in `todo`.
    pub todo: u64,
    /// Tasks in `doing`.
    pub doing: u64,
    /// Tasks in `done`.
    pub done: u64,
}

/// Status counts of the progress aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    /// Tasks in `todo`.
    pub todo: u64,
    /// Tasks in `doing`.
    pub doing: u64,
    /// Tasks in `done`.
    pub done: u64,
}

/// Derived progress of an event board, memoized with a TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressDto {
    /// The event.
    pub event_id: EventId,
    /// Total number of tasks.
    pub total_tasks: u64,
    /// Status counts over all lists.
    pub counts: ProgressCounts,
    /// `done / total * 100`, rounded to one decimal; 0.0 for an empty board.
    pub percent_done: f64,
    /// Per-list breakdown, ordered by `(order, id)`.
    pub by_list: Vec<ProgressListDto>,
    /// Generation timestamp (UTC, trailing `Z`).
    pub generated_at: String,
    /// TTL the aggregate is cached with.
    pub ttl_seconds: u64,
}
