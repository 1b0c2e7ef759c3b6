// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{backend, join, next_broadcast, participant_id, seed_event, seed_user};

use rally_model::{Role, TaskId, TaskListId, TaskStatus};
use rally_service::{
    board::{TaskInput, TaskListInput},
    Error,
};

fn task_input(list: TaskListId, title: &str) -> TaskInput {
    TaskInput {
        list,
        title: title.to_string(),
        description: String::new(),
        status: None,
        assignee: None,
        start_at: None,
        due_at: None,
        depends_on: vec![],
    }
}

async fn orders_of(backend: &common::Backend, list: TaskListId) -> Vec<(TaskId, i64)> {
    backend
        .store
        .view(move |tables| tables.tasks_of_list(list).iter().map(|t| (t.id, t.order)).collect())
        .await
}

#[tokio::test]
async fn create_reorder_delete_keeps_orders_compact() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();

    let a = backend.board.create_task(owner, task_input(list.id, "A")).await.unwrap();
    let b = backend.board.create_task(owner, task_input(list.id, "B")).await.unwrap();
    let c = backend.board.create_task(owner, task_input(list.id, "C")).await.unwrap();

    assert_eq!(
        orders_of(&backend, list.id).await,
        vec![(a.id, 0), (b.id, 1), (c.id, 2)]
    );

    backend
        .board
        .reorder_tasks(list.id, owner, vec![c.id, a.id, b.id])
        .await
        .unwrap();
    assert_eq!(
        orders_of(&backend, list.id).await,
        vec![(c.id, 0), (a.id, 1), (b.id, 2)]
    );

    backend.board.delete_task(c.id, owner).await.unwrap();
    assert_eq!(orders_of(&backend, list.id).await, vec![(a.id, 0), (b.id, 1)]);
}

#[tokio::test]
async fn reorder_twice_is_a_no_op() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;
    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();
    let a = backend.board.create_task(owner, task_input(list.id, "A")).await.unwrap();
    let b = backend.board.create_task(owner, task_input(list.id, "B")).await.unwrap();

    backend.board.reorder_tasks(list.id, owner, vec![b.id, a.id]).await.unwrap();
    let first = orders_of(&backend, list.id).await;
    backend.board.reorder_tasks(list.id, owner, vec![b.id, a.id]).await.unwrap();

    assert_eq!(first, orders_of(&backend, list.id).await);
}

#[tokio::test]
async fn reorder_rejects_bad_id_sets() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;
    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();
    let a = backend.board.create_task(owner, task_input(list.id, "A")).await.unwrap();
    let b = backend.board.create_task(owner, task_input(list.id, "B")).await.unwrap();

    // Duplicate, missing, and foreign ids all fail the multiset check.
    for bad in [
        vec![a.id, a.id],
        vec![a.id],
        vec![a.id, b.id, TaskId(999)],
        vec![],
    ] {
        assert!(matches!(
            backend.board.reorder_tasks(list.id, owner, bad).await,
            Err(Error::Validation { .. })
        ));
    }

    // Empty is valid only for an empty target.
    let empty = backend
        .board
        .create_list(owner, TaskListInput { event, title: "empty".to_string() })
        .await
        .unwrap();
    assert!(backend.board.reorder_tasks(empty.id, owner, vec![]).await.is_ok());
}

#[tokio::test]
async fn list_orders_are_compact_after_delete() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    let first = backend
        .board
        .create_list(owner, TaskListInput { event, title: "one".to_string() })
        .await
        .unwrap();
    let second = backend
        .board
        .create_list(owner, TaskListInput { event, title: "two".to_string() })
        .await
        .unwrap();
    let third = backend
        .board
        .create_list(owner, TaskListInput { event, title: "three".to_string() })
        .await
        .unwrap();
    assert_eq!((first.order, second.order, third.order), (0, 1, 2));

    backend.board.delete_list(second.id, owner).await.unwrap();

    let remaining: Vec<(TaskListId, i64)> = backend
        .store
        .view(move |tables| {
            tables
                .task_lists_of_event(event)
                .iter()
                .map(|l| (l.id, l.order))
                .collect()
        })
        .await;
    assert_eq!(remaining, vec![(first.id, 0), (third.id, 1)]);
}

#[tokio::test]
async fn status_change_requires_done_dependencies() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;
    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();

    let t0 = backend.board.create_task(owner, task_input(list.id, "T0")).await.unwrap();
    let mut input = task_input(list.id, "T1");
    input.depends_on = vec![t0.id];
    let t1 = backend.board.create_task(owner, input).await.unwrap();

    assert!(matches!(
        backend.board.set_status(t1.id, owner, TaskStatus::Doing).await,
        Err(Error::Validation { .. })
    ));

    backend.board.set_status(t0.id, owner, TaskStatus::Done).await.unwrap();
    assert!(backend.board.set_status(t1.id, owner, TaskStatus::Doing).await.is_ok());
    assert!(backend.board.set_status(t1.id, owner, TaskStatus::Done).await.is_ok());
}

#[tokio::test]
async fn status_is_gated_to_organizer_or_assignee() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let stranger = seed_user(&backend, "stranger@example.com", "Stranger").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;
    join(&backend, event, stranger, Role::Member).await;

    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();
    let task = backend.board.create_task(owner, task_input(list.id, "T")).await.unwrap();

    // A plain member that is not assigned cannot move the task.
    assert!(matches!(
        backend.board.set_status(task.id, member, TaskStatus::Doing).await,
        Err(Error::Forbidden { .. })
    ));

    backend.board.take(task.id, member).await.unwrap();
    assert!(backend.board.set_status(task.id, member, TaskStatus::Doing).await.is_ok());
    // Still not the other member.
    assert!(matches!(
        backend.board.set_status(task.id, stranger, TaskStatus::Done).await,
        Err(Error::Forbidden { .. })
    ));
}

#[tokio::test]
async fn take_race_has_exactly_one_winner() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let p1 = seed_user(&backend, "p1@example.com", "P1").await;
    let p2 = seed_user(&backend, "p2@example.com", "P2").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, p1, Role::Member).await;
    join(&backend, event, p2, Role::Member).await;

    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();
    let task = backend.board.create_task(owner, task_input(list.id, "T")).await.unwrap();

    let board1 = backend.board.clone();
    let board2 = backend.board.clone();
    let (r1, r2) = tokio::join!(board1.take(task.id, p1), board2.take(task.id, p2));

    let winners = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let r1_is_ok = r1.is_ok();
    let loser = if r1_is_ok { r2 } else { r1 };
    assert!(matches!(loser, Err(Error::Conflict { code: "already_assigned" })));

    let winner_user = if r1_is_ok { p1 } else { p2 };
    let expected = participant_id(&backend, event, winner_user).await;
    let assignee = backend
        .store
        .view(move |tables| tables.tasks.get(task.id).unwrap().assignee)
        .await;
    assert_eq!(assignee, Some(expected));
}

#[tokio::test]
async fn assignment_validates_event_membership() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let outsider_owner = seed_user(&backend, "other@example.com", "Other").await;
    let event = seed_event(&backend, owner, "offsite").await;
    let other_event = seed_event(&backend, outsider_owner, "another").await;

    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();
    let task = backend.board.create_task(owner, task_input(list.id, "T")).await.unwrap();

    // A participant of a different event cannot be assigned.
    let foreign = participant_id(&backend, other_event, outsider_owner).await;
    assert!(matches!(
        backend.board.assign(task.id, owner, Some(foreign)).await,
        Err(Error::Validation { .. })
    ));

    let own = participant_id(&backend, event, owner).await;
    let updated = backend.board.assign(task.id, owner, Some(own)).await.unwrap();
    assert_eq!(updated.assignee, Some(own));

    let cleared = backend.board.assign(task.id, owner, None).await.unwrap();
    assert_eq!(cleared.assignee, None);
}

#[tokio::test]
async fn board_mutations_broadcast_in_commit_order() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;
    let mut sub = backend.hub.subscribe(event);

    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();
    let task = backend.board.create_task(owner, task_input(list.id, "A")).await.unwrap();
    backend.board.reorder_tasks(list.id, owner, vec![task.id]).await.unwrap();
    backend.board.delete_task(task.id, owner).await.unwrap();

    let expected = [
        "tasklist.created",
        "progress.invalidate",
        "task.created",
        "progress.invalidate",
        "task.reordered",
        "progress.invalidate",
        "task.deleted",
        "progress.invalidate",
    ];
    for kind in expected {
        assert_eq!(next_broadcast(&mut sub).await.message_type, kind);
    }
}

#[tokio::test]
async fn member_cannot_mutate_the_board() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;

    assert!(matches!(
        backend
            .board
            .create_list(member, TaskListInput { event, title: "nope".to_string() })
            .await,
        Err(Error::Forbidden { .. })
    ));

    // Reads are open to every participant.
    assert!(backend.board.board(event, member).await.is_ok());
}
