// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The poll service: lifecycle, the vote state machine and optimistic versioning.
//!
//! `version` increases monotonically per poll and is bumped inside the same transaction as the
//! change it describes. Consumers may discard `poll.updated` deltas whose version is not newer
//! than their local one.

use serde_json::json;
use time::{Date, OffsetDateTime};

use std::collections::BTreeSet;

use rally_hub::Hub;
use rally_model::{
    dto::{PollDto, PollOptionDto, PollReadDto},
    EventId, Poll, PollId, PollKind, PollOption, PollOptionId, UserId, Vote,
};
use rally_storage::{Store, Tables};

use crate::{
    error::Error,
    policy::{Action, Viewer},
};

const QUESTION_MAX: usize = 200;
const LABEL_MAX: usize = 200;

/// One option of a poll to create.
#[derive(Debug, Clone)]
pub struct PollOptionInput {
    /// Label, required for place/custom polls.
    pub label: Option<String>,
    /// Date, required for date polls.
    pub date_value: Option<Date>,
}

/// Input of poll creation.
#[derive(Debug, Clone)]
pub struct PollInput {
    /// Owning event.
    pub event: EventId,
    /// Kind of the poll.
    pub kind: PollKind,
    /// The question, 1..=200 chars after trimming.
    pub question: String,
    /// Whether several options may be picked.
    pub multiple: bool,
    /// Whether a cast vote may be changed.
    pub allow_change_vote: bool,
    /// Optional automatic close timestamp.
    pub end_at: Option<OffsetDateTime>,
    /// At least two options.
    pub options: Vec<PollOptionInput>,
}

/// The polls service.
#[derive(Clone)]
pub struct PollService {
    store: Store,
    hub: Hub,
}

/// Normalized creation payload for one option.
enum NormalizedOption {
    Label(String),
    Day(Date),
}

fn normalize_options(kind: PollKind, options: &[PollOptionInput]) -> Result<Vec<NormalizedOption>, Error> {
    if options.len() < 2 {
        return Err(Error::validation("options", "At least two options are required."));
    }

    let mut normalized = Vec::with_capacity(options.len());
    match kind {
        PollKind::Date => {
            let mut seen = BTreeSet::new();
            for option in options {
                let date = option
                    .date_value
                    .ok_or_else(|| Error::validation("options", "Date polls require a date for every option."))?;
                if !seen.insert(date) {
                    return Err(Error::validation("options", "Dates must be unique."));
                }
                normalized.push(NormalizedOption::Day(date));
            }
        }
        PollKind::Place | PollKind::Custom => {
            let mut seen = BTreeSet::new();
            for option in options {
                let label = option
                    .label
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .ok_or_else(|| Error::validation("options", "Every option needs a non-empty label."))?;
                if label.chars().count() > LABEL_MAX {
                    return Err(Error::validation("options", "Option labels are too long."));
                }
                if !seen.insert(label.to_string()) {
                    return Err(Error::validation("options", "Labels must be unique."));
                }
                normalized.push(NormalizedOption::Label(label.to_string()));
            }
        }
    }
    Ok(normalized)
}

/// Builds the viewer-agnostic DTO with per-option tallies and derived fields.
fn poll_dto(tables: &Tables, poll: &Poll) -> PollDto {
    let mut options = Vec::new();
    let mut total_votes = 0u64;
    let mut max_votes = 0u64;

    for option in tables.options_of_poll(poll.id) {
        let votes_count = tables.votes_for_option(option.id);
        total_votes += votes_count;
        max_votes = max_votes.max(votes_count);
        options.push(PollOptionDto {
            id: option.id,
            label: option.label.clone(),
            date_value: option.date_value,
            votes_count,
        });
    }

    let leader_option_ids = if max_votes == 0 {
        Vec::new()
    } else {
        options
            .iter()
            .filter(|o| o.votes_count == max_votes)
            .map(|o| o.id)
            .collect()
    };

    PollDto {
        id: poll.id,
        event: poll.event,
        kind: poll.kind,
        question: poll.question.clone(),
        multiple: poll.multiple,
        allow_change_vote: poll.allow_change_vote,
        is_closed: poll.is_closed,
        end_at: poll.end_at,
        created_at: poll.created_at,
        version: poll.version,
        options,
        total_votes,
        leader_option_ids,
    }
}

fn poll_read_dto(tables: &Tables, poll: &Poll, viewer: UserId) -> PollReadDto {
    let mut my_votes = tables.votes_of_user(poll.id, viewer);
    my_votes.sort_unstable();
    PollReadDto {
        poll: poll_dto(tables, poll),
        my_votes,
    }
}

impl PollService {
    /// Creates the service.
    pub fn new(store: Store, hub: Hub) -> Self {
        Self { store, hub }
    }

    /// Creates a poll with its options; organizer-gated. The version starts at 1.
    pub async fn create(&self, user: UserId, input: PollInput) -> Result<PollReadDto, Error> {
        let question = input.question.trim().to_string();
        if question.is_empty() {
            return Err(Error::validation("question", "The question must not be empty."));
        }
        if question.chars().count() > QUESTION_MAX {
            return Err(Error::validation("question", "The question is too long."));
        }
        let normalized = normalize_options(input.kind, &input.options)?;
        let now = rally_common::time::now_utc();

        let dto = self
            .store
            .transaction_and(
                |tables| {
                    Viewer::resolve(tables, input.event, user)?.require(Action::Organize)?;

                    let id = tables.polls.next_id();
                    tables.polls.insert(
                        id,
                        Poll {
                            id,
                            event: input.event,
                            created_by: user,
                            kind: input.kind,
                            question: question.clone(),
                            multiple: input.multiple,
                            allow_change_vote: input.allow_change_vote,
                            is_closed: false,
                            end_at: input.end_at,
                            closing_notification_sent_at: None,
                            closing_notification_for_end_at: None,
                            version: 1,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    for option in &normalized {
                        let option_id = tables.poll_options.next_id();
                        let (label, date_value) = match option {
                            NormalizedOption::Label(label) => (Some(label.clone()), None),
                            NormalizedOption::Day(date) => (None, Some(*date)),
                        };
                        tables.poll_options.insert(
                            option_id,
                            PollOption {
                                id: option_id,
                                poll: id,
                                label,
                                date_value,
                            },
                        );
                    }

                    let poll = tables.polls.get(id).expect("just inserted");
                    Ok(poll_read_dto(tables, poll, user))
                },
                |dto| {
                    self.hub.publish(
                        input.event,
                        "poll.created",
                        json!({
                            "event_id": input.event,
                            "poll": dto.poll.clone(),
                            "version": dto.poll.version,
                        }),
                        None,
                    );
                },
            )
            .await?;
        Ok(dto)
    }

    /// Lists the polls of an event, newest first; participant-gated. `is_closed` filters by
    /// the manual close flag when given.
    pub async fn list(&self, event: EventId, user: UserId, is_closed: Option<bool>) -> Result<Vec<PollReadDto>, Error> {
        self.store
            .view(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::View)?;

                let mut polls: Vec<&Poll> = tables
                    .polls
                    .values()
                    .filter(|p| p.event == event)
                    .filter(|p| is_closed.map_or(true, |wanted| p.is_closed == wanted))
                    .collect();
                polls.sort_by_key(|p| (std::cmp::Reverse(p.created_at), std::cmp::Reverse(p.id)));
                Ok(polls.into_iter().map(|p| poll_read_dto(tables, p, user)).collect())
            })
            .await
    }

    /// Serves one poll to a participant of its event.
    pub async fn get(&self, poll: PollId, user: UserId) -> Result<PollReadDto, Error> {
        self.store
            .view(|tables| {
                let row = tables.polls.get(poll).ok_or_else(|| Error::not_found("poll"))?;
                Viewer::resolve(tables, row.event, user)?.require(Action::View)?;
                Ok(poll_read_dto(tables, row, user))
            })
            .await
    }

    /// Closes a poll; organizer-gated and idempotent. Only the first close bumps the version
    /// and broadcasts.
    pub async fn close(&self, poll: PollId, user: UserId) -> Result<PollReadDto, Error> {
        let now = rally_common::time::now_utc();

        let (dto, _, _) = self
            .store
            .transaction_and(
                |tables| {
                    let row = tables.polls.get(poll).ok_or_else(|| Error::not_found("poll"))?;
                    let event = row.event;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                    if row.is_closed {
                        return Ok((poll_read_dto(tables, row, user), event, false));
                    }

                    let row = tables.polls.get_mut(poll).expect("resolved above");
                    row.is_closed = true;
                    row.version += 1;
                    row.updated_at = now;

                    let row = tables.polls.get(poll).expect("resolved above");
                    Ok((poll_read_dto(tables, row, user), event, true))
                },
                |(dto, event, first_close)| {
                    if *first_close {
                        self.hub.publish(
                            *event,
                            "poll.closed",
                            json!({
                                "event_id": event,
                                "poll_id": poll,
                                "version": dto.poll.version,
                            }),
                            None,
                        );
                    }
                },
            )
            .await?;
        Ok(dto)
    }

    /// Deletes a poll with its options and votes; organizer-gated.
    pub async fn delete(&self, poll: PollId, user: UserId) -> Result<(), Error> {
        self.store
            .transaction_and(
                |tables| {
                    let row = tables.polls.get(poll).ok_or_else(|| Error::not_found("poll"))?;
                    let event = row.event;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;
                    tables.delete_poll(poll);
                    Ok(event)
                },
                |event| {
                    self.hub
                        .publish(*event, "poll.deleted", json!({ "event_id": event, "poll_id": poll }), None);
                },
            )
            .await?;
        Ok(())
    }

    /// Casts, changes or confirms the caller's vote set.
    ///
    /// The existing votes of the caller are read under the write lock; single-choice changes
    /// are applied as delete-all-then-insert-one so a corrupt multi-row pre-state self-heals.
    pub async fn vote(&self, poll: PollId, user: UserId, option_ids: Vec<PollOptionId>) -> Result<PollReadDto, Error> {
        let now = rally_common::time::now_utc();

        let requested: BTreeSet<PollOptionId> = option_ids.iter().copied().collect();
        if requested.len() != option_ids.len() {
            return Err(Error::validation("option_ids", "Options must not repeat."));
        }

        let (dto, _, _) = self
            .store
            .transaction_and(
                |tables| {
                    let row = tables.polls.get(poll).ok_or_else(|| Error::not_found("poll"))?;
                    let event = row.event;
                    let multiple = row.multiple;
                    let allow_change_vote = row.allow_change_vote;
                    Viewer::resolve(tables, event, user)?.require(Action::View)?;

                    if row.is_voting_closed(now) {
                        return Err(Error::invalid("Voting is closed."));
                    }
                    if !multiple && option_ids.len() != 1 {
                        return Err(Error::validation("option_ids", "Exactly one option must be picked."));
                    }
                    let valid_ids: BTreeSet<PollOptionId> = tables.options_of_poll(poll).iter().map(|o| o.id).collect();
                    if !requested.is_subset(&valid_ids) {
                        return Err(Error::validation("option_ids", "Options must belong to this poll."));
                    }

                    let existing: BTreeSet<PollOptionId> = tables.votes_of_user(poll, user).into_iter().collect();

                    let (to_insert, to_delete) = if !multiple {
                        let chosen = option_ids[0];
                        if existing.len() == 1 && existing.contains(&chosen) {
                            (BTreeSet::new(), BTreeSet::new())
                        } else if !existing.is_empty() && !allow_change_vote && !existing.contains(&chosen) {
                            return Err(Error::invalid("Changing the vote is not allowed."));
                        } else {
                            let to_delete: BTreeSet<PollOptionId> =
                                existing.iter().copied().filter(|id| *id != chosen).collect();
                            let to_insert: BTreeSet<PollOptionId> = if existing.contains(&chosen) {
                                BTreeSet::new()
                            } else {
                                BTreeSet::from([chosen])
                            };
                            (to_insert, to_delete)
                        }
                    } else {
                        if !existing.is_empty() && !allow_change_vote && requested != existing {
                            return Err(Error::invalid("Changing the vote is not allowed."));
                        }
                        let to_delete: BTreeSet<PollOptionId> = if allow_change_vote {
                            existing.difference(&requested).copied().collect()
                        } else {
                            BTreeSet::new()
                        };
                        let to_insert: BTreeSet<PollOptionId> = requested.difference(&existing).copied().collect();
                        (to_insert, to_delete)
                    };

                    let changed = !to_insert.is_empty() || !to_delete.is_empty();

                    if changed {
                        if !to_delete.is_empty() {
                            let doomed: Vec<_> = tables
                                .votes
                                .values()
                                .filter(|v| v.poll == poll && v.user == user && to_delete.contains(&v.option))
                                .map(|v| v.id)
                                .collect();
                            for id in doomed {
                                tables.votes.remove(id);
                            }
                        }
                        for option in &to_insert {
                            let id = tables.votes.next_id();
                            tables.votes.insert(
                                id,
                                Vote {
                                    id,
                                    poll,
                                    option: *option,
                                    user,
                                    created_at: now,
                                },
                            );
                        }
                        let row = tables.polls.get_mut(poll).expect("resolved above");
                        row.version += 1;
                        row.updated_at = now;
                    }

                    let row = tables.polls.get(poll).expect("resolved above");
                    let touched: BTreeSet<PollOptionId> = to_insert.union(&to_delete).copied().collect();
                    Ok((poll_read_dto(tables, row, user), event, if changed { Some(touched) } else { None }))
                },
                |(dto, event, delta)| {
                    if let Some(touched) = delta {
                        // Delta restricted to the options the transaction touched.
                        let options: Vec<_> = dto
                            .poll
                            .options
                            .iter()
                            .filter(|o| touched.contains(&o.id))
                            .map(|o| json!({ "id": o.id, "votes_count": o.votes_count }))
                            .collect();
                        self.hub.publish(
                            *event,
                            "poll.updated",
                            json!({
                                "event_id": event,
                                "poll_id": poll,
                                "options": options,
                                "total_votes": dto.poll.total_votes,
                                "leader_option_ids": dto.poll.leader_option_ids.clone(),
                                "version": dto.poll.version,
                            }),
                            None,
                        );
                    }
                },
            )
            .await?;
        Ok(dto)
    }
}
