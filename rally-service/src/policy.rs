// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Role resolution and the per-endpoint policy gate.
//!
//! A [`Viewer`] is resolved once per request against the store snapshot the operation runs on
//! and is never shared across requests. Every endpoint states its requirement as a single
//! [`Action`]; composition is explicit boolean logic at the call site.

use rally_model::{EventId, Role, UserId};
use rally_storage::Tables;

use crate::error::Error;

/// What an endpoint requires of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Any participant of the event.
    View,
    /// An organizer of the event.
    Organize,
    /// The event owner.
    Own,
}

/// The caller resolved against one event.
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    /// The calling user.
    pub user: UserId,
    /// The event in scope.
    pub event: EventId,
    /// Role of the caller within the event, if a participant.
    pub role: Option<Role>,
    /// Whether the caller owns the event row.
    pub is_owner: bool,
}

impl Viewer {
    /// Resolves the caller's role for an event. Fails with `NotFound` for unknown events.
    pub fn resolve(tables: &Tables, event: EventId, user: UserId) -> Result<Self, Error> {
        let event_row = tables.events.get(event).ok_or_else(|| Error::not_found("event"))?;
        let role = tables.participant_of(event, user).map(|p| p.role);

        Ok(Self {
            user,
            event,
            role,
            is_owner: event_row.owner == user,
        })
    }

    /// Whether the caller is a participant at all.
    pub fn is_participant(&self) -> bool {
        self.role.is_some()
    }

    /// Whether the caller holds the organizer role.
    pub fn is_organizer(&self) -> bool {
        matches!(self.role, Some(Role::Organizer))
    }

    /// Checks the caller against a required action.
    pub fn require(&self, action: Action) -> Result<(), Error> {
        let allowed = match action {
            Action::View => self.is_participant(),
            Action::Organize => self.is_organizer(),
            Action::Own => self.is_owner,
        };
        if allowed { Ok(()) } else { Err(Error::forbidden()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rally_model::{Event, Participant, ParticipantId};
    use time::macros::datetime;

    fn tables_with_event() -> Tables {
        let mut tables = Tables::default();
        let now = datetime!(2023-01-01 00:00:00 UTC);
        tables.events.insert(
            EventId(1),
            Event {
                id: EventId(1),
                owner: UserId(1),
                title: "offsite".to_string(),
                category: String::new(),
                description: String::new(),
                location: String::new(),
                start_at: None,
                end_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        tables.participants.insert(
            ParticipantId(1),
            Participant {
                id: ParticipantId(1),
                user: UserId(1),
                event: EventId(1),
                role: Role::Organizer,
                joined_at: now,
            },
        );
        tables.participants.insert(
            ParticipantId(2),
            Participant {
                id: ParticipantId(2),
                user: UserId(2),
                event: EventId(1),
                role: Role::Member,
                joined_at: now,
            },
        );
        tables
    }

    #[test]
    fn organizer_passes_all_participant_gates() {
        let tables = tables_with_event();
        let viewer = Viewer::resolve(&tables, EventId(1), UserId(1)).unwrap();

        assert!(viewer.require(Action::View).is_ok());
        assert!(viewer.require(Action::Organize).is_ok());
        assert!(viewer.require(Action::Own).is_ok());
    }

    #[test]
    fn member_fails_role_gates() {
        let tables = tables_with_event();
        let viewer = Viewer::resolve(&tables, EventId(1), UserId(2)).unwrap();

        assert!(viewer.require(Action::View).is_ok());
        assert!(matches!(viewer.require(Action::Organize), Err(Error::Forbidden { .. })));
        assert!(matches!(viewer.require(Action::Own), Err(Error::Forbidden { .. })));
    }

    #[test]
    fn outsider_fails_view() {
        let tables = tables_with_event();
        let viewer = Viewer::resolve(&tables, EventId(1), UserId(9)).unwrap();

        assert!(matches!(viewer.require(Action::View), Err(Error::Forbidden { .. })));
    }

    #[test]
    fn unknown_event_is_not_found() {
        let tables = tables_with_event();

        assert!(matches!(
            Viewer::resolve(&tables, EventId(404), UserId(1)),
            Err(Error::NotFound { .. })
        ));
    }
}
