// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::sync::Arc;

use rally_hub::{Hub, InProcessBroker};
use rally_model::UserId;
use rally_rest_api::{config::RestApiConfig, ApiArgs, ApiArgsInner};
use rally_service::{
    account::{AccountService, RegisterInput},
    board::BoardService,
    chat::ChatService,
    event::EventService,
    export::ExportService,
    invite::InviteService,
    mailer::RecordingMailer,
    participant::ParticipantService,
    poll::PollService,
    progress::ProgressEngine,
};
use rally_storage::{Cache, Store};

pub const SECRET: &[u8] = b"rest-api-test-secret";
pub const FRONT_URL: &str = "http://front.test";

pub struct TestNode {
    pub args: ApiArgs,
    pub store: Store,
    pub hub: Hub,
    pub mailer: Arc<RecordingMailer>,
}

pub fn test_node() -> TestNode {
    let store = Store::new();
    let hub = Hub::new(Arc::new(InProcessBroker::default()));
    let cache = Cache::in_process();
    let mailer = Arc::new(RecordingMailer::new());
    let progress = ProgressEngine::new(store.clone(), cache, hub.clone());

    let args: ApiArgs = Arc::new(ApiArgsInner {
        config: RestApiConfig::default(),
        accounts: AccountService::new(store.clone(), mailer.clone(), SECRET.to_vec(), FRONT_URL.to_string()),
        events: EventService::new(store.clone()),
        board: BoardService::new(store.clone(), hub.clone(), progress.clone()),
        polls: PollService::new(store.clone(), hub.clone()),
        chat: ChatService::new(store.clone(), hub.clone()),
        invites: InviteService::new(store.clone(), FRONT_URL.to_string()),
        participants: ParticipantService::new(store.clone()),
        progress,
        exports: ExportService::new(store.clone()),
        hub: hub.clone(),
        store: store.clone(),
    });

    TestNode {
        args,
        store,
        hub,
        mailer,
    }
}

/// Registers, activates and logs a user in; returns its id and a bearer access token.
pub async fn active_user(node: &TestNode, email: &str, name: &str) -> (UserId, String) {
    let profile = node
        .args
        .accounts
        .register(RegisterInput {
            email: email.to_string(),
            password: "sup3rsecret".to_string(),
            name: Some(name.to_string()),
        })
        .await
        .unwrap();

    let id = profile.id;
    node.store
        .transaction::<_, ()>(move |tables| {
            tables.users.get_mut(id).unwrap().is_active = true;
            Ok(())
        })
        .await
        .unwrap();

    let (pair, _) = node
        .args
        .accounts
        .login(email, "sup3rsecret")
        .await
        .expect("activated user logs in");
    (id, pair.access)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
