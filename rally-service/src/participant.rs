// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Participant management.
//!
//! The last-organizer guard is enforced as an explicit transactional precondition and
//! re-asserted against the mutated tables before commit, so no code path can leave an event
//! without an organizer.

use rally_model::{dto::ParticipantDto, EventId, ParticipantId, Role, UserId};
use rally_storage::{Store, Tables};

use crate::{
    error::Error,
    policy::{Action, Viewer},
};

/// Orderings of the roster listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterOrder {
    /// By display name, case-insensitive.
    Name,
    /// Organizers first, then by display name.
    Role,
}

impl Default for RosterOrder {
    fn default() -> Self {
        Self::Name
    }
}

/// The participants service.
#[derive(Clone)]
pub struct ParticipantService {
    store: Store,
}

fn assert_has_organizer(tables: &Tables, event: EventId) -> Result<(), Error> {
    if tables.organizer_count(event) == 0 {
        return Err(Error::Forbidden { code: "last_organizer" });
    }
    Ok(())
}

impl ParticipantService {
    /// Creates the service.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Lists the roster of an event; organizer-gated.
    pub async fn list(&self, event: EventId, user: UserId, order: RosterOrder) -> Result<Vec<ParticipantDto>, Error> {
        self.store
            .view(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                let mut roster: Vec<ParticipantDto> = tables
                    .participants_of_event(event)
                    .into_iter()
                    .filter_map(|p| tables.users.get(p.user).map(|u| ParticipantDto::from_participant(p, u)))
                    .collect();

                match order {
                    RosterOrder::Name => {
                        roster.sort_by_cached_key(|p| (display_key(p), p.id));
                    }
                    RosterOrder::Role => {
                        roster.sort_by_cached_key(|p| (p.role == Role::Member, display_key(p), p.id));
                    }
                }
                Ok(roster)
            })
            .await
    }

    /// Changes a participant's role; organizer-gated with the last-organizer guard.
    pub async fn update_role(
        &self,
        event: EventId,
        participant: ParticipantId,
        user: UserId,
        role: Role,
    ) -> Result<ParticipantDto, Error> {
        self.store
            .transaction(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                let row = tables
                    .participants
                    .get(participant)
                    .filter(|p| p.event == event)
                    .ok_or_else(|| Error::not_found("participant"))?;

                if row.role == Role::Organizer && role == Role::Member && tables.organizer_count(event) == 1 {
                    let code = if row.user == user { "self_last_organizer" } else { "last_organizer" };
                    return Err(Error::Forbidden { code });
                }

                let row = tables.participants.get_mut(participant).expect("resolved above");
                row.role = role;

                assert_has_organizer(tables, event)?;

                let row = tables.participants.get(participant).expect("resolved above");
                let user_row = tables.users.get(row.user).ok_or_else(|| Error::not_found("user"))?;
                Ok(ParticipantDto::from_participant(row, user_row))
            })
            .await
    }

    /// Removes a participant; organizer-gated with the last-organizer guard. Tasks assigned
    /// to the removed participant survive unassigned.
    pub async fn remove(&self, event: EventId, participant: ParticipantId, user: UserId) -> Result<(), Error> {
        self.store
            .transaction(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                let row = tables
                    .participants
                    .get(participant)
                    .filter(|p| p.event == event)
                    .ok_or_else(|| Error::not_found("participant"))?;

                if row.role == Role::Organizer && tables.organizer_count(event) == 1 {
                    let code = if row.user == user { "self_last_organizer" } else { "last_organizer" };
                    return Err(Error::Forbidden { code });
                }

                tables.delete_participant(participant);

                assert_has_organizer(tables, event)?;
                Ok(())
            })
            .await
    }
}

fn display_key(p: &ParticipantDto) -> String {
    p.user
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(&p.user.email)
        .to_lowercase()
}
