// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The task board service: columns, tasks, ordering and the reorder engine.
//!
//! Order invariant: within a list (and, for columns, within an event) the committed `order`
//! values are exactly `0..N-1`. Creation appends without moving other rows; deletion runs a
//! normalization pass in a follow-up transaction; explicit reorders assign positions from the
//! requested sequence under the write lock.

use serde_json::json;
use time::OffsetDateTime;

use std::collections::BTreeSet;

use rally_hub::Hub;
use rally_model::{
    dto::{BoardDto, BoardEventRef, BoardListDto, ParticipantDto, TaskDto, TaskListDto},
    EventId, ParticipantId, Task, TaskId, TaskList, TaskListId, TaskStatus, UserId,
};
use rally_storage::{Store, Tables};

use crate::{
    error::Error,
    policy::{Action, Viewer},
    progress::ProgressEngine,
};

const TITLE_MAX: usize = 200;

/// Input of column creation.
#[derive(Debug, Clone)]
pub struct TaskListInput {
    /// Owning event.
    pub event: EventId,
    /// Title, 1..=200 chars after trimming.
    pub title: String,
}

/// Input of task creation.
#[derive(Debug, Clone)]
pub struct TaskInput {
    /// Owning list.
    pub list: TaskListId,
    /// Title, 1..=200 chars after trimming.
    pub title: String,
    /// Description.
    pub description: String,
    /// Initial status; defaults to `todo`.
    pub status: Option<TaskStatus>,
    /// Initial assignee; must be a participant of the same event.
    pub assignee: Option<ParticipantId>,
    /// Optional start timestamp.
    pub start_at: Option<OffsetDateTime>,
    /// Optional deadline.
    pub due_at: Option<OffsetDateTime>,
    /// Dependencies; must live within the same event.
    pub depends_on: Vec<TaskId>,
}

/// Partial update of a task; `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New assignee.
    pub assignee: Option<Option<ParticipantId>>,
    /// New start timestamp.
    pub start_at: Option<Option<OffsetDateTime>>,
    /// New deadline.
    pub due_at: Option<Option<OffsetDateTime>>,
    /// New dependency set.
    pub depends_on: Option<Vec<TaskId>>,
}

/// The task board service.
#[derive(Clone)]
pub struct BoardService {
    store: Store,
    hub: Hub,
    progress: ProgressEngine,
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

fn validate_schedule(start_at: Option<OffsetDateTime>, due_at: Option<OffsetDateTime>) -> Result<(), Error> {
    if let (Some(start), Some(due)) = (start_at, due_at) {
        if due < start {
            return Err(Error::validation("due_at", "Deadline must not precede the start."));
        }
    }
    Ok(())
}

fn validate_assignee(tables: &Tables, event: EventId, assignee: Option<ParticipantId>) -> Result<(), Error> {
    if let Some(assignee) = assignee {
        let participant = tables
            .participants
            .get(assignee)
            .ok_or_else(|| Error::validation("assignee", "Participant not found."))?;
        if participant.event != event {
            return Err(Error::validation("assignee", "Assignee must belong to the same event."));
        }
    }
    Ok(())
}

fn validate_dependencies(
    tables: &Tables,
    event: EventId,
    task: Option<TaskId>,
    depends_on: &BTreeSet<TaskId>,
) -> Result<(), Error> {
    for dep in depends_on {
        if Some(*dep) == task {
            return Err(Error::validation("depends_on", "A task cannot depend on itself."));
        }
        match tables.event_of_task(*dep) {
            Some(dep_event) if dep_event == event => {}
            _ => {
                return Err(Error::validation(
                    "depends_on",
                    "All dependencies must belong to the same event.",
                ));
            }
        }
    }
    Ok(())
}

fn require_dependencies_done(tables: &Tables, depends_on: &BTreeSet<TaskId>) -> Result<(), Error> {
    let incomplete = depends_on
        .iter()
        .filter_map(|id| tables.tasks.get(*id))
        .any(|t| t.status != TaskStatus::Done);
    if incomplete {
        return Err(Error::validation(
            "status",
            "Dependencies must be done before the task can move forward.",
        ));
    }
    Ok(())
}

fn invalid_ids() -> Error {
    Error::validation("ordered_ids", "invalid_ids")
}

/// Checks that `ordered_ids` is a duplicate-free permutation of `current`.
fn validate_permutation<I: Ord + Copy>(ordered_ids: &[I], current: &[I]) -> Result<(), Error> {
    let requested: BTreeSet<I> = ordered_ids.iter().copied().collect();
    if requested.len() != ordered_ids.len() {
        return Err(invalid_ids());
    }
    let existing: BTreeSet<I> = current.iter().copied().collect();
    if requested != existing {
        return Err(invalid_ids());
    }
    Ok(())
}

impl BoardService {
    /// Creates the service.
    pub fn new(store: Store, hub: Hub, progress: ProgressEngine) -> Self {
        Self { store, hub, progress }
    }

    /// Serves the full board snapshot to a participant.
    pub async fn board(&self, event: EventId, user: UserId) -> Result<BoardDto, Error> {
        self.store
            .view(|tables| {
                let viewer = Viewer::resolve(tables, event, user)?;
                viewer.require(Action::View)?;

                let event_row = tables.events.get(event).expect("resolved above");
                let lists = tables
                    .task_lists_of_event(event)
                    .into_iter()
                    .map(|list| BoardListDto {
                        list: TaskListDto::from_task_list(list),
                        tasks: tables.tasks_of_list(list.id).into_iter().map(TaskDto::from_task).collect(),
                    })
                    .collect();
                let participants = tables
                    .participants_of_event(event)
                    .into_iter()
                    .filter_map(|p| tables.users.get(p.user).map(|u| ParticipantDto::from_participant(p, u)))
                    .collect();

                Ok(BoardDto {
                    event: BoardEventRef {
                        id: event,
                        title: event_row.title.clone(),
                    },
                    lists,
                    participants,
                    viewer_role: viewer.role,
                    is_owner: viewer.is_owner,
                })
            })
            .await
    }

    /// Creates a column at the end of the board; organizer-gated.
    pub async fn create_list(&self, user: UserId, input: TaskListInput) -> Result<TaskListDto, Error> {
        let title = validate_title(&input.title)?;
        let event = input.event;
        let now = rally_common::time::now_utc();

        let dto = self
            .store
            .transaction_and(
                |tables| {
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                    // Append: one read of the current maximum, no other row moves.
                    let order = tables.task_lists_of_event(event).last().map_or(0, |l| l.order + 1);
                    let id = tables.task_lists.next_id();
                    tables.task_lists.insert(
                        id,
                        TaskList {
                            id,
                            event,
                            title: title.clone(),
                            order,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    Ok(TaskListDto::from_task_list(tables.task_lists.get(id).expect("just inserted")))
                },
                |dto| {
                    self.hub
                        .publish(event, "tasklist.created", serde_json::to_value(dto).unwrap_or(json!({})), None);
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(dto)
    }

    /// Renames a column; organizer-gated.
    pub async fn rename_list(&self, list: TaskListId, user: UserId, title: &str) -> Result<TaskListDto, Error> {
        let title = validate_title(title)?;
        let now = rally_common::time::now_utc();

        let (dto, event) = self
            .store
            .transaction(|tables| {
                let event = tables.event_of_list(list).ok_or_else(|| Error::not_found("task list"))?;
                Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                let row = tables.task_lists.get_mut(list).expect("resolved above");
                row.title = title.clone();
                row.updated_at = now;
                Ok((TaskListDto::from_task_list(row), event))
            })
            .await?;

        self.progress.invalidate(event).await;
        Ok(dto)
    }

    /// Deletes a column with its tasks and renumbers the remaining columns; organizer-gated.
    pub async fn delete_list(&self, list: TaskListId, user: UserId) -> Result<(), Error> {
        let event = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables.event_of_list(list).ok_or_else(|| Error::not_found("task list"))?;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;
                    tables.delete_task_list(list);
                    Ok(event)
                },
                |event| {
                    self.hub
                        .publish(*event, "tasklist.deleted", json!({ "id": list, "event": event }), None);
                },
            )
            .await?;

        // The cascade committed; renumbering runs in its own transaction and is idempotent.
        let now = rally_common::time::now_utc();
        self.store
            .transaction::<_, Error>(|tables| {
                tables.normalize_task_list_orders_in_event(event, now);
                Ok(())
            })
            .await?;

        self.progress.invalidate(event).await;
        Ok(())
    }

    /// Applies an explicit column order; organizer-gated.
    pub async fn reorder_lists(&self, event: EventId, user: UserId, ordered_ids: Vec<TaskListId>) -> Result<(), Error> {
        let now = rally_common::time::now_utc();

        self.store
            .transaction_and(
                |tables| {
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                    let current: Vec<TaskListId> = tables.task_lists_of_event(event).iter().map(|l| l.id).collect();
                    validate_permutation(&ordered_ids, &current)?;

                    for (index, id) in ordered_ids.iter().enumerate() {
                        let row = tables.task_lists.get_mut(*id).expect("validated above");
                        row.order = index as i64;
                        row.updated_at = now;
                    }
                    Ok(())
                },
                |_: &()| {
                    self.hub.publish(
                        event,
                        "tasklist.reordered",
                        json!({ "event": event, "ordered_ids": ordered_ids.clone() }),
                        None,
                    );
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(())
    }

    /// Creates a task at the end of its list; organizer-gated.
    pub async fn create_task(&self, user: UserId, input: TaskInput) -> Result<TaskDto, Error> {
        let title = validate_title(&input.title)?;
        validate_schedule(input.start_at, input.due_at)?;
        let now = rally_common::time::now_utc();
        let status = input.status.unwrap_or(TaskStatus::Todo);
        let depends_on: BTreeSet<TaskId> = input.depends_on.iter().copied().collect();

        let (dto, event) = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables
                        .event_of_list(input.list)
                        .ok_or_else(|| Error::not_found("task list"))?;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;
                    validate_assignee(tables, event, input.assignee)?;
                    validate_dependencies(tables, event, None, &depends_on)?;
                    if matches!(status, TaskStatus::Doing | TaskStatus::Done) {
                        require_dependencies_done(tables, &depends_on)?;
                    }

                    let order = tables.tasks_of_list(input.list).last().map_or(0, |t| t.order + 1);
                    let id = tables.tasks.next_id();
                    tables.tasks.insert(
                        id,
                        Task {
                            id,
                            list: input.list,
                            title: title.clone(),
                            description: input.description.clone(),
                            status,
                            assignee: input.assignee,
                            start_at: input.start_at,
                            due_at: input.due_at,
                            deadline_reminder_sent_at: None,
                            deadline_reminder_for_due_at: None,
                            order,
                            depends_on: depends_on.clone(),
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    Ok((TaskDto::from_task(tables.tasks.get(id).expect("just inserted")), event))
                },
                |(dto, event)| {
                    self.hub
                        .publish(*event, "task.created", serde_json::to_value(dto).unwrap_or(json!({})), None);
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(dto)
    }

    /// Applies a partial update to a task; organizer-gated.
    pub async fn update_task(&self, task: TaskId, user: UserId, update: TaskUpdate) -> Result<TaskDto, Error> {
        let title = update.title.as_deref().map(validate_title).transpose()?;
        let now = rally_common::time::now_utc();

        let (dto, event) = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables.event_of_task(task).ok_or_else(|| Error::not_found("task"))?;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                    let row = tables.tasks.get(task).expect("resolved above");
                    let start_at = update.start_at.unwrap_or(row.start_at);
                    let due_at = update.due_at.unwrap_or(row.due_at);
                    validate_schedule(start_at, due_at)?;

                    let assignee = update.assignee.unwrap_or(row.assignee);
                    validate_assignee(tables, event, assignee)?;

                    let depends_on: BTreeSet<TaskId> = match &update.depends_on {
                        Some(ids) => ids.iter().copied().collect(),
                        None => row.depends_on.clone(),
                    };
                    validate_dependencies(tables, event, Some(task), &depends_on)?;

                    let status = update.status.unwrap_or(row.status);
                    if matches!(status, TaskStatus::Doing | TaskStatus::Done) {
                        require_dependencies_done(tables, &depends_on)?;
                    }

                    let row = tables.tasks.get_mut(task).expect("resolved above");
                    if let Some(title) = title.clone() {
                        row.title = title;
                    }
                    if let Some(description) = update.description.clone() {
                        row.description = description;
                    }
                    row.status = status;
                    row.assignee = assignee;
                    row.start_at = start_at;
                    row.due_at = due_at;
                    row.depends_on = depends_on;
                    row.updated_at = now;

                    Ok((TaskDto::from_task(row), event))
                },
                |(dto, event)| {
                    self.hub
                        .publish(*event, "task.updated", serde_json::to_value(dto).unwrap_or(json!({})), None);
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(dto)
    }

    /// Deletes a task and renumbers its list; organizer-gated.
    pub async fn delete_task(&self, task: TaskId, user: UserId) -> Result<(), Error> {
        let (event, list) = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables.event_of_task(task).ok_or_else(|| Error::not_found("task"))?;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;
                    let list = tables.tasks.get(task).expect("resolved above").list;
                    tables.delete_task(task);
                    Ok((event, list))
                },
                |(event, list)| {
                    self.hub
                        .publish(*event, "task.deleted", json!({ "id": task, "list": list }), None);
                },
            )
            .await?;

        let now = rally_common::time::now_utc();
        self.store
            .transaction::<_, Error>(|tables| {
                tables.normalize_task_orders_in_list(list, now);
                Ok(())
            })
            .await?;

        self.progress.invalidate(event).await;
        Ok(())
    }

    /// Applies an explicit task order within a list; organizer-gated.
    pub async fn reorder_tasks(&self, list: TaskListId, user: UserId, ordered_ids: Vec<TaskId>) -> Result<(), Error> {
        let now = rally_common::time::now_utc();

        let event = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables.event_of_list(list).ok_or_else(|| Error::not_found("task list"))?;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;

                    let current: Vec<TaskId> = tables.tasks_of_list(list).iter().map(|t| t.id).collect();
                    validate_permutation(&ordered_ids, &current)?;

                    for (index, id) in ordered_ids.iter().enumerate() {
                        let row = tables.tasks.get_mut(*id).expect("validated above");
                        row.order = index as i64;
                        row.updated_at = now;
                    }
                    Ok(event)
                },
                |event| {
                    self.hub.publish(
                        *event,
                        "task.reordered",
                        json!({ "list": list, "ordered_ids": ordered_ids.clone() }),
                        None,
                    );
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(())
    }

    /// Changes a task's status; allowed for organizers and the current assignee.
    pub async fn set_status(&self, task: TaskId, user: UserId, status: TaskStatus) -> Result<TaskDto, Error> {
        let now = rally_common::time::now_utc();

        let (dto, event) = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables.event_of_task(task).ok_or_else(|| Error::not_found("task"))?;
                    let viewer = Viewer::resolve(tables, event, user)?;

                    let row = tables.tasks.get(task).expect("resolved above");
                    let is_assignee = row
                        .assignee
                        .and_then(|id| tables.participants.get(id))
                        .map_or(false, |p| p.user == user);
                    if !viewer.is_organizer() && !is_assignee {
                        return Err(Error::forbidden());
                    }

                    if matches!(status, TaskStatus::Doing | TaskStatus::Done) {
                        require_dependencies_done(tables, &row.depends_on)?;
                    }

                    let row = tables.tasks.get_mut(task).expect("resolved above");
                    row.status = status;
                    row.updated_at = now;
                    Ok((TaskDto::from_task(row), event))
                },
                |(dto, event)| {
                    self.hub
                        .publish(*event, "task.updated", serde_json::to_value(dto).unwrap_or(json!({})), None);
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(dto)
    }

    /// Sets or clears a task's assignee; organizer-gated.
    pub async fn assign(&self, task: TaskId, user: UserId, assignee: Option<ParticipantId>) -> Result<TaskDto, Error> {
        let now = rally_common::time::now_utc();

        let (dto, event) = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables.event_of_task(task).ok_or_else(|| Error::not_found("task"))?;
                    Viewer::resolve(tables, event, user)?.require(Action::Organize)?;
                    validate_assignee(tables, event, assignee)?;

                    let row = tables.tasks.get_mut(task).expect("resolved above");
                    row.assignee = assignee;
                    row.updated_at = now;
                    Ok((TaskDto::from_task(row), event))
                },
                |(dto, event)| {
                    self.hub
                        .publish(*event, "task.updated", serde_json::to_value(dto).unwrap_or(json!({})), None);
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(dto)
    }

    /// Self-assigns an unassigned task. Exactly one of two concurrent callers wins; the loser
    /// observes `already_assigned`.
    pub async fn take(&self, task: TaskId, user: UserId) -> Result<TaskDto, Error> {
        let now = rally_common::time::now_utc();

        let (dto, event) = self
            .store
            .transaction_and(
                |tables| {
                    let event = tables.event_of_task(task).ok_or_else(|| Error::not_found("task"))?;
                    let viewer = Viewer::resolve(tables, event, user)?;
                    viewer.require(Action::View)?;
                    let participant = tables.participant_of(event, user).expect("participant gate above").id;

                    let row = tables.tasks.get_mut(task).expect("resolved above");
                    // Conditional update: only the first writer finds the slot empty.
                    if row.assignee.is_some() {
                        return Err(Error::Conflict { code: "already_assigned" });
                    }
                    row.assignee = Some(participant);
                    row.updated_at = now;
                    Ok((TaskDto::from_task(row), event))
                },
                |(dto, event)| {
                    self.hub
                        .publish(*event, "task.updated", serde_json::to_value(dto).unwrap_or(json!({})), None);
                },
            )
            .await?;

        self.progress.invalidate(event).await;
        Ok(dto)
    }
}
