// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The HTTP and WebSocket surface of the rally backend.
//!
//! Routes are warp filters, one module per resource, combined by [`routes::filter_all`] and
//! recovered by a single rejection handler. The WebSocket gateway lives in [`ws`].

#![warn(missing_docs)]

mod filters;

pub mod auth;
pub mod config;
pub mod pagination;
pub mod path_params;
pub mod rejection;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use rally_hub::Hub;
use rally_storage::Store;
use rally_service::{
    account::AccountService, board::BoardService, chat::ChatService, event::EventService, export::ExportService,
    invite::InviteService, participant::ParticipantService, poll::PollService, progress::ProgressEngine,
};

use config::RestApiConfig;

/// Everything the route handlers need, shared behind an [`Arc`].
pub struct ApiArgsInner {
    /// Surface configuration.
    pub config: RestApiConfig,
    /// Accounts and tokens.
    pub accounts: AccountService,
    /// Events CRUD.
    pub events: EventService,
    /// Task board.
    pub board: BoardService,
    /// Polls.
    pub polls: PollService,
    /// Chat.
    pub chat: ChatService,
    /// Invites.
    pub invites: InviteService,
    /// Participant management.
    pub participants: ParticipantService,
    /// Derived progress.
    pub progress: ProgressEngine,
    /// Exports.
    pub exports: ExportService,
    /// The broadcast hub.
    pub hub: Hub,
    /// The store; the gateway consults it for the participant gate of the handshake.
    pub store: Store,
}

/// Shared handle to the API context.
pub type ApiArgs = Arc<ApiArgsInner>;

/// Serves the complete surface until the shutdown signal resolves.
pub async fn serve(args: ApiArgs, shutdown: rally_common::task::ShutdownRx) {
    use warp::Filter;

    log::info!("Running.");

    let addr = args.config.binding_socket_addr();
    let routes = routes::filter_all(args).recover(rejection::handle_rejection);

    let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        shutdown.await.ok();
    });

    server.await;

    log::info!("Stopped.");
}
