// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{backend, join, participant_id, seed_event, seed_user};

use rally_model::Role;
use rally_service::{
    board::{TaskInput, TaskListInput},
    participant::RosterOrder,
    Error,
};

#[tokio::test]
async fn roster_is_organizer_gated_and_ordered() {
    let backend = backend();
    let owner = seed_user(&backend, "zoe@example.com", "Zoe").await;
    let anna = seed_user(&backend, "anna@example.com", "Anna").await;
    let mike = seed_user(&backend, "mike@example.com", "Mike").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, anna, Role::Member).await;
    join(&backend, event, mike, Role::Member).await;

    assert!(matches!(
        backend.participants.list(event, anna, RosterOrder::Name).await,
        Err(Error::Forbidden { .. })
    ));

    let by_name = backend.participants.list(event, owner, RosterOrder::Name).await.unwrap();
    let names: Vec<&str> = by_name.iter().map(|p| p.user.name.as_deref().unwrap()).collect();
    assert_eq!(names, vec!["Anna", "Mike", "Zoe"]);

    let by_role = backend.participants.list(event, owner, RosterOrder::Role).await.unwrap();
    assert_eq!(by_role[0].role, Role::Organizer);
    assert_eq!(by_role[0].user.name.as_deref(), Some("Zoe"));
}

#[tokio::test]
async fn promote_and_demote_roundtrip() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    let member_part = join(&backend, event, member, Role::Member).await;

    let promoted = backend
        .participants
        .update_role(event, member_part, owner, Role::Organizer)
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Organizer);

    // With two organizers, the original owner can now be demoted by the other organizer.
    let owner_part = participant_id(&backend, event, owner).await;
    let demoted = backend
        .participants
        .update_role(event, owner_part, member, Role::Member)
        .await
        .unwrap();
    assert_eq!(demoted.role, Role::Member);
}

#[tokio::test]
async fn the_last_organizer_cannot_be_demoted_or_removed() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;

    let owner_part = participant_id(&backend, event, owner).await;

    // Demoting yourself as sole organizer carries its own code.
    assert!(matches!(
        backend.participants.update_role(event, owner_part, owner, Role::Member).await,
        Err(Error::Forbidden { code: "self_last_organizer" })
    ));
    assert!(matches!(
        backend.participants.remove(event, owner_part, owner).await,
        Err(Error::Forbidden { code: "self_last_organizer" })
    ));

    // The event still has its organizer.
    let organizers = backend.store.view(move |tables| tables.organizer_count(event)).await;
    assert_eq!(organizers, 1);
}

#[tokio::test]
async fn removal_unassigns_tasks_of_the_removed_participant() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let event = seed_event(&backend, owner, "offsite").await;
    let member_part = join(&backend, event, member, Role::Member).await;

    let list = backend
        .board
        .create_list(owner, TaskListInput { event, title: "todo".to_string() })
        .await
        .unwrap();
    let task = backend
        .board
        .create_task(
            owner,
            TaskInput {
                list: list.id,
                title: "T".to_string(),
                description: String::new(),
                status: None,
                assignee: Some(member_part),
                start_at: None,
                due_at: None,
                depends_on: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(task.assignee, Some(member_part));

    backend.participants.remove(event, member_part, owner).await.unwrap();

    let assignee = backend
        .store
        .view(move |tables| tables.tasks.get(task.id).unwrap().assignee)
        .await;
    assert_eq!(assignee, None);
}

#[tokio::test]
async fn members_cannot_manage_the_roster() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let other = seed_user(&backend, "other@example.com", "Other").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;
    let other_part = join(&backend, event, other, Role::Member).await;

    assert!(matches!(
        backend.participants.remove(event, other_part, member).await,
        Err(Error::Forbidden { .. })
    ));
    assert!(matches!(
        backend.participants.update_role(event, other_part, member, Role::Organizer).await,
        Err(Error::Forbidden { .. })
    ));

    // Unknown targets resolve to 404 for organizers.
    assert!(matches!(
        backend.participants.remove(event, rally_model::ParticipantId(999), owner).await,
        Err(Error::NotFound { .. })
    ));
}
