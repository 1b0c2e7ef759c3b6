// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The in-memory transactional store.
//!
//! This engine implements the contract the relational database honors in production: write
//! transactions are serialized (which subsumes `SELECT … FOR UPDATE` row locking on contended
//! rows), commit atomically and roll back on error. Writers mutate a copy of the tables and
//! commit by swapping it in, so a closure returning `Err` leaves no trace.
//!
//! Reads run concurrently against the committed state.

use time::OffsetDateTime;
use tokio::sync::RwLock;

use std::{collections::BTreeMap, sync::Arc};

use rally_model::{
    Event, EventId, Invite, InviteId, Message, MessageId, Participant, ParticipantId, Poll, PollId, PollOption,
    PollOptionId, Role, Task, TaskId, TaskList, TaskListId, User, UserId, Vote, VoteId,
};

/// A single table: ordered rows plus the id sequence.
#[derive(Debug, Clone)]
pub struct Table<K, V> {
    rows: BTreeMap<K, V>,
    next_id: u64,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<K: From<u64> + Ord + Copy, V> Table<K, V> {
    /// Allocates the next id of the sequence.
    pub fn next_id(&mut self) -> K {
        let id = self.next_id;
        self.next_id += 1;
        K::from(id)
    }

    /// Inserts a row under its id.
    pub fn insert(&mut self, id: K, row: V) {
        self.rows.insert(id, row);
    }

    /// Returns the row with the given id.
    pub fn get(&self, id: K) -> Option<&V> {
        self.rows.get(&id)
    }

    /// Returns the row with the given id, mutably.
    pub fn get_mut(&mut self, id: K) -> Option<&mut V> {
        self.rows.get_mut(&id)
    }

    /// Removes and returns the row with the given id.
    pub fn remove(&mut self, id: K) -> Option<V> {
        self.rows.remove(&id)
    }

    /// Whether a row with the given id exists.
    pub fn contains(&self, id: K) -> bool {
        self.rows.contains_key(&id)
    }

    /// Iterates over all rows in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.rows.iter()
    }

    /// Iterates over all rows in id order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.rows.values()
    }

    /// Iterates mutably over all rows in id order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.rows.values_mut()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The complete committed state.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    /// Users.
    pub users: Table<UserId, User>,
    /// Events.
    pub events: Table<EventId, Event>,
    /// Participants.
    pub participants: Table<ParticipantId, Participant>,
    /// Invites.
    pub invites: Table<InviteId, Invite>,
    /// Board columns.
    pub task_lists: Table<TaskListId, TaskList>,
    /// Tasks.
    pub tasks: Table<TaskId, Task>,
    /// Polls.
    pub polls: Table<PollId, Poll>,
    /// Poll options.
    pub poll_options: Table<PollOptionId, PollOption>,
    /// Votes.
    pub votes: Table<VoteId, Vote>,
    /// Chat messages.
    pub messages: Table<MessageId, Message>,
}

impl Tables {
    /// Looks a user up by email, case-insensitively.
    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        let email = email.to_lowercase();
        self.users.values().find(|u| u.email == email)
    }

    /// Looks an invite up by its token.
    pub fn invite_by_token(&self, token: &str) -> Option<&Invite> {
        self.invites.values().find(|i| i.token == token)
    }

    /// Returns the participant row for `(event, user)`, if any.
    pub fn participant_of(&self, event: EventId, user: UserId) -> Option<&Participant> {
        self.participants.values().find(|p| p.event == event && p.user == user)
    }

    /// Returns all participants of an event in id order.
    pub fn participants_of_event(&self, event: EventId) -> Vec<&Participant> {
        self.participants.values().filter(|p| p.event == event).collect()
    }

    /// Counts the organizers of an event.
    pub fn organizer_count(&self, event: EventId) -> usize {
        self.participants
            .values()
            .filter(|p| p.event == event && p.role == Role::Organizer)
            .count()
    }

    /// Returns the columns of an event ordered by `(order, id)`.
    pub fn task_lists_of_event(&self, event: EventId) -> Vec<&TaskList> {
        let mut lists: Vec<&TaskList> = self.task_lists.values().filter(|l| l.event == event).collect();
        lists.sort_by_key(|l| (l.order, l.id));
        lists
    }

    /// Returns the tasks of a list ordered by `(order, id)`.
    pub fn tasks_of_list(&self, list: TaskListId) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().filter(|t| t.list == list).collect();
        tasks.sort_by_key(|t| (t.order, t.id));
        tasks
    }

    /// Resolves the event a list belongs to.
    pub fn event_of_list(&self, list: TaskListId) -> Option<EventId> {
        self.task_lists.get(list).map(|l| l.event)
    }

    /// Resolves the event a task belongs to.
    pub fn event_of_task(&self, task: TaskId) -> Option<EventId> {
        self.tasks.get(task).and_then(|t| self.event_of_list(t.list))
    }

    /// Returns the options of a poll in id order.
    pub fn options_of_poll(&self, poll: PollId) -> Vec<&PollOption> {
        self.poll_options.values().filter(|o| o.poll == poll).collect()
    }

    /// Counts the votes cast for an option.
    pub fn votes_for_option(&self, option: PollOptionId) -> u64 {
        self.votes.values().filter(|v| v.option == option).count() as u64
    }

    /// Returns the option ids the user has voted for in a poll.
    pub fn votes_of_user(&self, poll: PollId, user: UserId) -> Vec<PollOptionId> {
        self.votes
            .values()
            .filter(|v| v.poll == poll && v.user == user)
            .map(|v| v.option)
            .collect()
    }

    /// Returns the messages of an event ordered by `(created_at, id)`.
    pub fn messages_of_event(&self, event: EventId) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.messages.values().filter(|m| m.event == event).collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        messages
    }

    /// Returns the most recent message of an author within an event.
    pub fn last_message_of_author(&self, event: EventId, author: UserId) -> Option<&Message> {
        self.messages
            .values()
            .filter(|m| m.event == event && m.author == author)
            .max_by_key(|m| (m.created_at, m.id))
    }

    /// Deletes a task and clears it from every `depends_on` set.
    pub fn delete_task(&mut self, task: TaskId) -> Option<Task> {
        let removed = self.tasks.remove(task);
        if removed.is_some() {
            for other in self.tasks.values_mut() {
                other.depends_on.remove(&task);
            }
        }
        removed
    }

    /// Deletes a column together with its tasks.
    pub fn delete_task_list(&mut self, list: TaskListId) -> Option<TaskList> {
        let removed = self.task_lists.remove(list)?;
        let task_ids: Vec<TaskId> = self.tasks.values().filter(|t| t.list == list).map(|t| t.id).collect();
        for id in task_ids {
            self.delete_task(id);
        }
        Some(removed)
    }

    /// Deletes a poll together with its options and votes.
    pub fn delete_poll(&mut self, poll: PollId) -> Option<Poll> {
        let removed = self.polls.remove(poll)?;
        let option_ids: Vec<PollOptionId> = self
            .poll_options
            .values()
            .filter(|o| o.poll == poll)
            .map(|o| o.id)
            .collect();
        for id in option_ids {
            self.poll_options.remove(id);
        }
        let vote_ids: Vec<VoteId> = self.votes.values().filter(|v| v.poll == poll).map(|v| v.id).collect();
        for id in vote_ids {
            self.votes.remove(id);
        }
        Some(removed)
    }

    /// Deletes a participant; tasks assigned to it survive unassigned.
    pub fn delete_participant(&mut self, participant: ParticipantId) -> Option<Participant> {
        let removed = self.participants.remove(participant);
        if removed.is_some() {
            for task in self.tasks.values_mut() {
                if task.assignee == Some(participant) {
                    task.assignee = None;
                }
            }
        }
        removed
    }

    /// Deletes an event and cascades over every owned child.
    pub fn delete_event(&mut self, event: EventId) -> Option<Event> {
        let removed = self.events.remove(event)?;

        let participant_ids: Vec<ParticipantId> = self
            .participants
            .values()
            .filter(|p| p.event == event)
            .map(|p| p.id)
            .collect();
        for id in participant_ids {
            self.participants.remove(id);
        }

        let invite_ids: Vec<InviteId> = self.invites.values().filter(|i| i.event == event).map(|i| i.id).collect();
        for id in invite_ids {
            self.invites.remove(id);
        }

        let list_ids: Vec<TaskListId> = self
            .task_lists
            .values()
            .filter(|l| l.event == event)
            .map(|l| l.id)
            .collect();
        for id in list_ids {
            self.delete_task_list(id);
        }

        let poll_ids: Vec<PollId> = self.polls.values().filter(|p| p.event == event).map(|p| p.id).collect();
        for id in poll_ids {
            self.delete_poll(id);
        }

        let message_ids: Vec<MessageId> = self.messages.values().filter(|m| m.event == event).map(|m| m.id).collect();
        for id in message_ids {
            self.messages.remove(id);
        }

        Some(removed)
    }

    /// Renumbers the tasks of a list to `0..N-1` by `(order, id)`. Idempotent.
    pub fn normalize_task_orders_in_list(&mut self, list: TaskListId, now: OffsetDateTime) {
        let mut ids: Vec<(i64, TaskId)> = self
            .tasks
            .values()
            .filter(|t| t.list == list)
            .map(|t| (t.order, t.id))
            .collect();
        ids.sort_unstable();
        for (index, (_, id)) in ids.into_iter().enumerate() {
            if let Some(task) = self.tasks.get_mut(id) {
                if task.order != index as i64 {
                    task.order = index as i64;
                    task.updated_at = now;
                }
            }
        }
    }

    /// Renumbers the columns of an event to `0..N-1` by `(order, id)`. Idempotent.
    pub fn normalize_task_list_orders_in_event(&mut self, event: EventId, now: OffsetDateTime) {
        let mut ids: Vec<(i64, TaskListId)> = self
            .task_lists
            .values()
            .filter(|l| l.event == event)
            .map(|l| (l.order, l.id))
            .collect();
        ids.sort_unstable();
        for (index, (_, id)) in ids.into_iter().enumerate() {
            if let Some(list) = self.task_lists.get_mut(id) {
                if list.order != index as i64 {
                    list.order = index as i64;
                    list.updated_at = now;
                }
            }
        }
    }
}

/// Handle to the transactional store; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Tables>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a read-only closure against the committed state.
    pub async fn view<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.inner.read().await;
        f(&tables)
    }

    /// Runs a write transaction.
    ///
    /// The closure receives a copy of the committed tables; `Ok` commits the copy atomically,
    /// `Err` discards it. Writers are serialized, so every row read inside the closure is
    /// effectively locked for the duration of the transaction.
    pub async fn transaction<T, E>(&self, f: impl FnOnce(&mut Tables) -> Result<T, E>) -> Result<T, E> {
        self.transaction_and(f, |_| ()).await
    }

    /// Runs a write transaction with a post-commit hook.
    ///
    /// `after_commit` runs once the copy is swapped in but before the write lock is released,
    /// so whatever it does (typically: queueing broadcasts) happens in commit order across
    /// concurrent writers. The hook must not block.
    pub async fn transaction_and<T, E>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, E>,
        after_commit: impl FnOnce(&T),
    ) -> Result<T, E> {
        let mut tables = self.inner.write().await;
        let mut draft = tables.clone();
        let value = f(&mut draft)?;
        *tables = draft;
        after_commit(&value);
        Ok(value)
    }
}
