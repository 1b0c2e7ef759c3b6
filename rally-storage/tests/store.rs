// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

use rally_model::{
    Event, EventId, Participant, ParticipantId, Role, Task, TaskId, TaskList, TaskListId, TaskStatus, User, UserId,
};
use rally_storage::{Store, Tables};

use time::macros::datetime;

use std::collections::BTreeSet;

fn now() -> time::OffsetDateTime {
    datetime!(2023-05-01 10:00:00 UTC)
}

fn user(id: u64) -> User {
    User {
        id: UserId(id),
        email: format!("user{}@example.com", id),
        name: None,
        avatar_url: None,
        is_active: true,
        is_staff: false,
        is_superuser: false,
        email_notifications_enabled: true,
        password_hash: vec![],
        password_salt: vec![],
        created_at: now(),
    }
}

fn event(id: u64, owner: u64) -> Event {
    Event {
        id: EventId(id),
        owner: UserId(owner),
        title: "offsite".to_string(),
        category: String::new(),
        description: String::new(),
        location: String::new(),
        start_at: None,
        end_at: None,
        created_at: now(),
        updated_at: now(),
    }
}

fn task_list(id: u64, event: u64, order: i64) -> TaskList {
    TaskList {
        id: TaskListId(id),
        event: EventId(event),
        title: format!("list {}", id),
        order,
        created_at: now(),
        updated_at: now(),
    }
}

fn task(id: u64, list: u64, order: i64) -> Task {
    Task {
        id: TaskId(id),
        list: TaskListId(list),
        title: format!("task {}", id),
        description: String::new(),
        status: TaskStatus::Todo,
        assignee: None,
        start_at: None,
        due_at: None,
        deadline_reminder_sent_at: None,
        deadline_reminder_for_due_at: None,
        order,
        depends_on: BTreeSet::new(),
        created_at: now(),
        updated_at: now(),
    }
}

fn seed(tables: &mut Tables) {
    tables.users.insert(UserId(1), user(1));
    tables.users.insert(UserId(2), user(2));
    tables.events.insert(EventId(1), event(1, 1));
    tables.participants.insert(
        ParticipantId(1),
        Participant {
            id: ParticipantId(1),
            user: UserId(1),
            event: EventId(1),
            role: Role::Organizer,
            joined_at: now(),
        },
    );
    tables.participants.insert(
        ParticipantId(2),
        Participant {
            id: ParticipantId(2),
            user: UserId(2),
            event: EventId(1),
            role: Role::Member,
            joined_at: now(),
        },
    );
}

#[tokio::test]
async fn failed_transaction_rolls_back() {
    let store = Store::new();

    store
        .transaction::<_, ()>(|tables| {
            seed(tables);
            Ok(())
        })
        .await
        .unwrap();

    let result: Result<(), &str> = store
        .transaction(|tables| {
            tables.users.insert(UserId(99), user(99));
            tables.delete_event(EventId(1));
            Err("nope")
        })
        .await;

    assert!(result.is_err());
    store
        .view(|tables| {
            assert!(tables.users.get(UserId(99)).is_none());
            assert!(tables.events.get(EventId(1)).is_some());
        })
        .await;
}

#[tokio::test]
async fn event_cascade_wipes_children() {
    let store = Store::new();

    store
        .transaction::<_, ()>(|tables| {
            seed(tables);
            tables.task_lists.insert(TaskListId(1), task_list(1, 1, 0));
            tables.tasks.insert(TaskId(1), task(1, 1, 0));
            tables.tasks.insert(TaskId(2), task(2, 1, 1));
            Ok(())
        })
        .await
        .unwrap();

    store
        .transaction::<_, ()>(|tables| {
            tables.delete_event(EventId(1));
            Ok(())
        })
        .await
        .unwrap();

    store
        .view(|tables| {
            assert!(tables.events.is_empty());
            assert!(tables.participants.is_empty());
            assert!(tables.task_lists.is_empty());
            assert!(tables.tasks.is_empty());
            // Users survive; they are not owned by the event.
            assert_eq!(tables.users.len(), 2);
        })
        .await;
}

#[tokio::test]
async fn deleting_a_participant_unassigns_its_tasks() {
    let store = Store::new();

    store
        .transaction::<_, ()>(|tables| {
            seed(tables);
            tables.task_lists.insert(TaskListId(1), task_list(1, 1, 0));
            let mut t = task(1, 1, 0);
            t.assignee = Some(ParticipantId(2));
            tables.tasks.insert(TaskId(1), t);
            Ok(())
        })
        .await
        .unwrap();

    store
        .transaction::<_, ()>(|tables| {
            tables.delete_participant(ParticipantId(2));
            Ok(())
        })
        .await
        .unwrap();

    store
        .view(|tables| {
            let t = tables.tasks.get(TaskId(1)).unwrap();
            assert_eq!(t.assignee, None);
        })
        .await;
}

#[tokio::test]
async fn deleting_a_task_clears_dependency_references() {
    let store = Store::new();

    store
        .transaction::<_, ()>(|tables| {
            seed(tables);
            tables.task_lists.insert(TaskListId(1), task_list(1, 1, 0));
            tables.tasks.insert(TaskId(1), task(1, 1, 0));
            let mut dependent = task(2, 1, 1);
            dependent.depends_on.insert(TaskId(1));
            tables.tasks.insert(TaskId(2), dependent);
            tables.delete_task(TaskId(1));
            Ok(())
        })
        .await
        .unwrap();

    store
        .view(|tables| {
            assert!(tables.tasks.get(TaskId(2)).unwrap().depends_on.is_empty());
        })
        .await;
}

#[tokio::test]
async fn normalization_compacts_orders_and_is_idempotent() {
    let store = Store::new();

    store
        .transaction::<_, ()>(|tables| {
            seed(tables);
            tables.task_lists.insert(TaskListId(1), task_list(1, 1, 0));
            tables.tasks.insert(TaskId(1), task(1, 1, 0));
            tables.tasks.insert(TaskId(2), task(2, 1, 3));
            tables.tasks.insert(TaskId(3), task(3, 1, 7));
            tables.normalize_task_orders_in_list(TaskListId(1), now());
            Ok(())
        })
        .await
        .unwrap();

    let orders = |tables: &Tables| -> Vec<(TaskId, i64)> {
        tables.tasks_of_list(TaskListId(1)).iter().map(|t| (t.id, t.order)).collect()
    };

    let first = store.view(|tables| orders(tables)).await;
    assert_eq!(first, vec![(TaskId(1), 0), (TaskId(2), 1), (TaskId(3), 2)]);

    // A second pass changes nothing.
    store
        .transaction::<_, ()>(|tables| {
            tables.normalize_task_orders_in_list(TaskListId(1), now());
            Ok(())
        })
        .await
        .unwrap();
    let second = store.view(|tables| orders(tables)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn email_lookup_is_case_insensitive() {
    let store = Store::new();

    store
        .transaction::<_, ()>(|tables| {
            seed(tables);
            Ok(())
        })
        .await
        .unwrap();

    store
        .view(|tables| {
            assert!(tables.user_by_email("USER1@Example.Com").is_some());
            assert!(tables.user_by_email("unknown@example.com").is_none());
        })
        .await;
}
