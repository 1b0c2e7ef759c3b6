// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Entity types, typed identifiers and wire DTOs shared across the rally backend.

#![warn(missing_docs)]

pub mod dto;
pub mod entity;
pub mod ids;

pub use entity::{
    Event, Invite, InviteStatus, Message, Participant, Poll, PollKind, PollOption, Role, Task, TaskList, TaskStatus,
    User, Vote,
};
pub use ids::{
    EventId, InviteId, MessageId, ParticipantId, PollId, PollOptionId, TaskId, TaskListId, UserId, VoteId,
};
