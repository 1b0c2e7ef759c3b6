// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{assert_no_broadcast, backend, join, next_broadcast, seed_event, seed_user};

use rally_model::{PollKind, PollOptionId, Role};
use rally_service::{
    poll::{PollInput, PollOptionInput},
    Error,
};

use time::macros::datetime;

fn labeled(label: &str) -> PollOptionInput {
    PollOptionInput {
        label: Some(label.to_string()),
        date_value: None,
    }
}

fn poll_input(event: rally_model::EventId, multiple: bool, allow_change_vote: bool) -> PollInput {
    PollInput {
        event,
        kind: PollKind::Custom,
        question: "where to?".to_string(),
        multiple,
        allow_change_vote,
        end_at: None,
        options: vec![labeled("O1"), labeled("O2"), labeled("O3")],
    }
}

#[tokio::test]
async fn create_requires_two_unique_options() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    let mut too_few = poll_input(event, false, true);
    too_few.options.truncate(1);
    assert!(matches!(
        backend.polls.create(owner, too_few).await,
        Err(Error::Validation { .. })
    ));

    let mut duplicated = poll_input(event, false, true);
    duplicated.options = vec![labeled("same"), labeled("same")];
    assert!(matches!(
        backend.polls.create(owner, duplicated).await,
        Err(Error::Validation { .. })
    ));

    let mut date_without_dates = poll_input(event, false, true);
    date_without_dates.kind = PollKind::Date;
    assert!(matches!(
        backend.polls.create(owner, date_without_dates).await,
        Err(Error::Validation { .. })
    ));

    let mut date_poll = poll_input(event, false, true);
    date_poll.kind = PollKind::Date;
    date_poll.options = vec![
        PollOptionInput {
            label: None,
            date_value: Some(datetime!(2023-07-01 00:00:00 UTC).date()),
        },
        PollOptionInput {
            label: None,
            date_value: Some(datetime!(2023-07-02 00:00:00 UTC).date()),
        },
    ];
    let created = backend.polls.create(owner, date_poll).await.unwrap();
    assert_eq!(created.poll.version, 1);
    assert_eq!(created.poll.options.len(), 2);
}

#[tokio::test]
async fn multi_vote_with_change_walks_the_versions() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let voter = seed_user(&backend, "voter@example.com", "Voter").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, voter, Role::Member).await;

    let mut sub = backend.hub.subscribe(event);
    let created = backend.polls.create(owner, poll_input(event, true, true)).await.unwrap();
    assert_eq!(next_broadcast(&mut sub).await.message_type, "poll.created");
    assert_eq!(created.poll.version, 1);

    let ids: Vec<PollOptionId> = created.poll.options.iter().map(|o| o.id).collect();
    let (o1, o2, o3) = (ids[0], ids[1], ids[2]);
    let poll = created.poll.id;

    // First vote: [O1, O2].
    let after_first = backend.polls.vote(poll, voter, vec![o1, o2]).await.unwrap();
    assert_eq!(after_first.poll.version, 2);
    assert_eq!(after_first.poll.total_votes, 2);
    assert_eq!(after_first.my_votes, vec![o1, o2]);
    let mut leaders = after_first.poll.leader_option_ids.clone();
    leaders.sort_unstable();
    assert_eq!(leaders, vec![o1, o2]);

    let update = next_broadcast(&mut sub).await;
    assert_eq!(update.message_type, "poll.updated");
    assert_eq!(update.payload["version"], 2);

    // Change to [O2, O3]: O1 drops to zero, O3 gains one.
    let after_second = backend.polls.vote(poll, voter, vec![o2, o3]).await.unwrap();
    assert_eq!(after_second.poll.version, 3);
    assert_eq!(after_second.poll.total_votes, 2);
    let mut leaders = after_second.poll.leader_option_ids.clone();
    leaders.sort_unstable();
    assert_eq!(leaders, vec![o2, o3]);

    let update = next_broadcast(&mut sub).await;
    assert_eq!(update.message_type, "poll.updated");
    assert_eq!(update.payload["version"], 3);
    let touched: Vec<(u64, u64)> = update.payload["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| (o["id"].as_u64().unwrap(), o["votes_count"].as_u64().unwrap()))
        .collect();
    assert!(touched.contains(&(o1.0, 0)));
    assert!(touched.contains(&(o3.0, 1)));

    // Close bumps the version once and broadcasts once.
    let closed = backend.polls.close(poll, owner).await.unwrap();
    assert_eq!(closed.poll.version, 4);
    assert_eq!(next_broadcast(&mut sub).await.message_type, "poll.closed");

    let closed_again = backend.polls.close(poll, owner).await.unwrap();
    assert_eq!(closed_again.poll.version, 4);
    assert_no_broadcast(&mut sub).await;

    // Voting against a closed poll fails.
    assert!(matches!(
        backend.polls.vote(poll, voter, vec![o1]).await,
        Err(Error::Validation { .. })
    ));
}

#[tokio::test]
async fn identical_vote_set_does_not_bump_the_version() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    let created = backend.polls.create(owner, poll_input(event, true, true)).await.unwrap();
    let ids: Vec<PollOptionId> = created.poll.options.iter().map(|o| o.id).collect();
    let poll = created.poll.id;

    let mut sub = backend.hub.subscribe(event);
    let first = backend.polls.vote(poll, owner, vec![ids[0]]).await.unwrap();
    assert_eq!(first.poll.version, 2);
    assert_eq!(next_broadcast(&mut sub).await.message_type, "poll.updated");

    let repeat = backend.polls.vote(poll, owner, vec![ids[0]]).await.unwrap();
    assert_eq!(repeat.poll.version, 2);
    assert_no_broadcast(&mut sub).await;
}

#[tokio::test]
async fn single_choice_change_moves_the_vote() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    let created = backend.polls.create(owner, poll_input(event, false, true)).await.unwrap();
    let ids: Vec<PollOptionId> = created.poll.options.iter().map(|o| o.id).collect();
    let poll = created.poll.id;

    backend.polls.vote(poll, owner, vec![ids[0]]).await.unwrap();
    let moved = backend.polls.vote(poll, owner, vec![ids[1]]).await.unwrap();

    assert_eq!(moved.poll.total_votes, 1);
    assert_eq!(moved.my_votes, vec![ids[1]]);
    assert_eq!(moved.poll.version, 3);
}

#[tokio::test]
async fn vote_change_can_be_forbidden() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    let created = backend.polls.create(owner, poll_input(event, false, false)).await.unwrap();
    let ids: Vec<PollOptionId> = created.poll.options.iter().map(|o| o.id).collect();
    let poll = created.poll.id;

    backend.polls.vote(poll, owner, vec![ids[0]]).await.unwrap();
    assert!(matches!(
        backend.polls.vote(poll, owner, vec![ids[1]]).await,
        Err(Error::Validation { .. })
    ));
    // Re-confirming the same choice is fine and changes nothing.
    let same = backend.polls.vote(poll, owner, vec![ids[0]]).await.unwrap();
    assert_eq!(same.poll.version, 2);
}

#[tokio::test]
async fn vote_validates_the_request_shape() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let event = seed_event(&backend, owner, "offsite").await;

    let single = backend.polls.create(owner, poll_input(event, false, true)).await.unwrap();
    let ids: Vec<PollOptionId> = single.poll.options.iter().map(|o| o.id).collect();

    // Single choice takes exactly one option.
    assert!(matches!(
        backend.polls.vote(single.poll.id, owner, vec![ids[0], ids[1]]).await,
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        backend.polls.vote(single.poll.id, owner, vec![]).await,
        Err(Error::Validation { .. })
    ));
    // Foreign option ids are rejected.
    assert!(matches!(
        backend.polls.vote(single.poll.id, owner, vec![PollOptionId(9999)]).await,
        Err(Error::Validation { .. })
    ));

    let multi = backend.polls.create(owner, poll_input(event, true, true)).await.unwrap();
    let ids: Vec<PollOptionId> = multi.poll.options.iter().map(|o| o.id).collect();
    // Duplicates within the request are rejected.
    assert!(matches!(
        backend.polls.vote(multi.poll.id, owner, vec![ids[0], ids[0]]).await,
        Err(Error::Validation { .. })
    ));
}

#[tokio::test]
async fn leaders_track_the_positive_maximum() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let other = seed_user(&backend, "other@example.com", "Other").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, other, Role::Member).await;

    let created = backend.polls.create(owner, poll_input(event, false, true)).await.unwrap();
    let ids: Vec<PollOptionId> = created.poll.options.iter().map(|o| o.id).collect();
    let poll = created.poll.id;

    // Nobody voted: no leaders.
    assert!(created.poll.leader_option_ids.is_empty());

    backend.polls.vote(poll, owner, vec![ids[0]]).await.unwrap();
    let one = backend.polls.get(poll, owner).await.unwrap();
    assert_eq!(one.poll.leader_option_ids, vec![ids[0]]);

    backend.polls.vote(poll, other, vec![ids[1]]).await.unwrap();
    let tied = backend.polls.get(poll, owner).await.unwrap();
    let mut leaders = tied.poll.leader_option_ids.clone();
    leaders.sort_unstable();
    assert_eq!(leaders, vec![ids[0], ids[1]]);
}

#[tokio::test]
async fn poll_gates_and_delete() {
    let backend = backend();
    let owner = seed_user(&backend, "owner@example.com", "Owner").await;
    let member = seed_user(&backend, "member@example.com", "Member").await;
    let stranger = seed_user(&backend, "stranger@example.com", "Stranger").await;
    let event = seed_event(&backend, owner, "offsite").await;
    join(&backend, event, member, Role::Member).await;

    // Members cannot create, close or delete.
    assert!(matches!(
        backend.polls.create(member, poll_input(event, false, true)).await,
        Err(Error::Forbidden { .. })
    ));

    let created = backend.polls.create(owner, poll_input(event, false, true)).await.unwrap();
    let poll = created.poll.id;
    assert!(matches!(
        backend.polls.close(poll, member).await,
        Err(Error::Forbidden { .. })
    ));
    // Strangers cannot even read or vote.
    assert!(matches!(
        backend.polls.get(poll, stranger).await,
        Err(Error::Forbidden { .. })
    ));

    let mut sub = backend.hub.subscribe(event);
    backend.polls.delete(poll, owner).await.unwrap();
    assert_eq!(next_broadcast(&mut sub).await.message_type, "poll.deleted");

    // Options and votes are gone with the poll.
    let leftovers = backend
        .store
        .view(move |tables| (tables.poll_options.len(), tables.votes.len()))
        .await;
    assert_eq!(leftovers, (0, 0));
}
