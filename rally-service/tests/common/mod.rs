// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use rally_hub::{BroadcastMessage, Hub, InProcessBroker, Subscription};
use rally_model::{Event, EventId, Participant, ParticipantId, Role, User, UserId};
use rally_service::{
    board::BoardService,
    chat::ChatService,
    event::EventService,
    invite::InviteService,
    jobs::NotificationJobs,
    mailer::RecordingMailer,
    participant::ParticipantService,
    poll::PollService,
    progress::ProgressEngine,
};
use rally_storage::{Cache, Store};

pub const FRONT_URL: &str = "http://front.test";

pub struct Backend {
    pub store: Store,
    pub hub: Hub,
    pub cache: Cache,
    pub events: EventService,
    pub board: BoardService,
    pub polls: PollService,
    pub chat: ChatService,
    pub invites: InviteService,
    pub participants: ParticipantService,
    pub progress: ProgressEngine,
    pub mailer: Arc<RecordingMailer>,
    pub jobs: NotificationJobs,
}

pub fn backend() -> Backend {
    let store = Store::new();
    let hub = Hub::new(Arc::new(InProcessBroker::default()));
    let cache = Cache::in_process();
    let progress = ProgressEngine::new(store.clone(), cache.clone(), hub.clone());
    let mailer = Arc::new(RecordingMailer::new());

    Backend {
        events: EventService::new(store.clone()),
        board: BoardService::new(store.clone(), hub.clone(), progress.clone()),
        polls: PollService::new(store.clone(), hub.clone()),
        chat: ChatService::new(store.clone(), hub.clone()),
        invites: InviteService::new(store.clone(), FRONT_URL.to_string()),
        participants: ParticipantService::new(store.clone()),
        jobs: NotificationJobs::new(store.clone(), mailer.clone()),
        progress,
        mailer,
        cache,
        store,
        hub,
    }
}

/// Inserts an active user directly into the store.
pub async fn seed_user(backend: &Backend, email: &str, name: &str) -> UserId {
    let email = email.to_lowercase();
    let name = name.to_string();
    backend
        .store
        .transaction::<_, ()>(move |tables| {
            let id = tables.users.next_id();
            tables.users.insert(
                id,
                User {
                    id,
                    email,
                    name: Some(name),
                    avatar_url: None,
                    is_active: true,
                    is_staff: false,
                    is_superuser: false,
                    email_notifications_enabled: true,
                    password_hash: vec![],
                    password_salt: vec![],
                    created_at: rally_common::time::now_utc(),
                },
            );
            Ok(id)
        })
        .await
        .unwrap()
}

/// Creates an event through the service, so the owner lands as organizer.
pub async fn seed_event(backend: &Backend, owner: UserId, title: &str) -> EventId {
    backend
        .events
        .create(
            owner,
            rally_service::event::EventInput {
                title: title.to_string(),
                category: String::new(),
                description: String::new(),
                location: String::new(),
                start_at: None,
                end_at: None,
            },
        )
        .await
        .unwrap()
        .id
}

/// Attaches a user to an event directly.
pub async fn join(backend: &Backend, event: EventId, user: UserId, role: Role) -> ParticipantId {
    backend
        .store
        .transaction::<_, ()>(move |tables| {
            let id = tables.participants.next_id();
            tables.participants.insert(
                id,
                Participant {
                    id,
                    user,
                    event,
                    role,
                    joined_at: rally_common::time::now_utc(),
                },
            );
            Ok(id)
        })
        .await
        .unwrap()
}

/// The participant id of a user within an event.
pub async fn participant_id(backend: &Backend, event: EventId, user: UserId) -> ParticipantId {
    backend
        .store
        .view(move |tables| tables.participant_of(event, user).map(|p| p.id))
        .await
        .expect("participant exists")
}

/// Receives the next broadcast within a short timeout.
pub async fn next_broadcast(sub: &mut Subscription) -> BroadcastMessage {
    tokio::time::timeout(Duration::from_millis(250), sub.recv())
        .await
        .expect("timed out waiting for a broadcast")
        .expect("subscription closed")
        .0
}

/// Asserts that no broadcast arrives within a short window.
pub async fn assert_no_broadcast(sub: &mut Subscription) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), sub.recv()).await;
    assert!(outcome.is_err(), "expected silence, got {:?}", outcome.map(|m| m.map(|(m, _)| m.message_type)));
}

/// Fetches an event row for assertions.
pub async fn event_row(backend: &Backend, event: EventId) -> Event {
    backend
        .store
        .view(move |tables| tables.events.get(event).cloned())
        .await
        .expect("event exists")
}
