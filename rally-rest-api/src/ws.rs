// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The WebSocket gateway.
//!
//! One connection per client. The handshake authenticates the caller (header or `?token=`),
//! checks event membership and subscribes the connection to its event group. Outbound frames
//! are size-capped; a frame that would exceed the cap is dropped whole, never sent partially.
//! Client `chat.typing` frames are rate limited per connection and never echoed back to their
//! sender.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use warp::{
    filters::BoxedFilter,
    path::Tail,
    ws::{Message, WebSocket, Ws},
    Filter, Rejection, Reply,
};

use std::time::{Duration, Instant};

use rally_hub::Envelope;
use rally_model::{EventId, UserId};

use crate::{auth::bearer_token, filters::with_args, ApiArgs};

/// Close code for a missing or non-numeric event id.
const CLOSE_BAD_REQUEST: u16 = 4400;
/// Close code for a missing/invalid token or an inactive account.
const CLOSE_UNAUTHORIZED: u16 = 4401;
/// Close code for a caller that is no participant of the event.
const CLOSE_FORBIDDEN: u16 = 4403;

/// Minimum pause between two typing broadcasts of one connection.
const TYPING_RATE_LIMIT: Duration = Duration::from_secs(1);

#[derive(serde::Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: Option<String>,
}

/// Matches the end of the path, tolerating the trailing slash browsers tend to keep.
fn path_end() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path::tail()
        .and_then(|tail: Tail| async move {
            if tail.as_str().is_empty() || tail.as_str() == "/" {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
}

/// The gateway route: `GET /ws/events/{event_id}`, with or without a trailing slash.
pub fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    warp::path("ws")
        .and(warp::path("events"))
        .and(warp::path::param::<String>())
        .and(path_end())
        .and(warp::ws())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::query::<TokenQuery>())
        .and(with_args(args))
        .map(
            |event_raw: String, ws: Ws, header: Option<String>, query: TokenQuery, args: ApiArgs| {
                ws.on_upgrade(move |socket| handle_connection(socket, event_raw, header, query.token, args))
            },
        )
        .boxed()
}

async fn handle_connection(
    mut socket: WebSocket,
    event_raw: String,
    header: Option<String>,
    query_token: Option<String>,
    args: ApiArgs,
) {
    let (event, user) = match handshake(&event_raw, header, query_token, &args).await {
        Ok(accepted) => accepted,
        Err((code, reason)) => {
            let _ = socket.send(Message::close_with(code, reason)).await;
            return;
        }
    };

    let user_name = args
        .store
        .view(|tables| tables.users.get(user).map(|u| u.display_name().to_string()))
        .await
        .unwrap_or_default();

    let metrics = args.hub.metrics();
    let mut subscription = args.hub.subscribe(event);
    metrics.connection_opened();
    log::info!("user {} connected to event {}", user, event);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<Message>();

    let max_message_size = args.config.ws_max_message_size();
    let writer_metrics = args.hub.metrics();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(message) => {
                        if ws_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                received = subscription.recv() => match received {
                    Some((message, skipped)) => {
                        if skipped > 0 {
                            writer_metrics.messages_dropped(skipped);
                            log::warn!("connection of user {} lagged, skipped {} message(s)", user, skipped);
                        }
                        // Self-echo suppression applies to typing only.
                        if message.message_type == "chat.typing" && message.sender_id == Some(user) {
                            continue;
                        }
                        let envelope = message.into_envelope();
                        match serde_json::to_string(&envelope) {
                            Ok(text) if text.len() <= max_message_size => {
                                if ws_tx.send(Message::text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {
                                writer_metrics.messages_dropped(1);
                                log::warn!(
                                    "dropping oversize `{}` frame for event {}",
                                    envelope.kind,
                                    event
                                );
                            }
                            Err(e) => log::warn!("unserializable envelope for event {}: {}", event, e),
                        }
                    }
                    None => break,
                },
            }
        }
    });

    let mut last_typing: Option<Instant> = None;
    while let Some(incoming) = ws_rx.next().await {
        let message = match incoming {
            Ok(message) => message,
            Err(e) => {
                log::debug!("read error on connection of user {}: {}", user, e);
                break;
            }
        };
        if message.is_close() {
            break;
        }
        if message.is_ping() {
            direct_tx.send(Message::pong(message.into_bytes())).ok();
            continue;
        }
        let text = match message.to_str() {
            Ok(text) => text,
            Err(_) => continue,
        };
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(_) => {
                log::debug!("ignoring malformed frame from user {}", user);
                continue;
            }
        };

        match envelope.kind.as_str() {
            "ping" => {
                let pong = Envelope::new("pong", json!({}));
                if let Ok(text) = serde_json::to_string(&pong) {
                    direct_tx.send(Message::text(text)).ok();
                }
            }
            "chat.typing" => {
                handle_typing(&args, event, user, &user_name, &envelope, &mut last_typing);
            }
            other => log::debug!("ignoring `{}` frame from user {}", other, user),
        }
    }

    writer.abort();
    metrics.connection_closed();
    log::info!("user {} disconnected from event {}", user, event);
}

async fn handshake(
    event_raw: &str,
    header: Option<String>,
    query_token: Option<String>,
    args: &ApiArgs,
) -> Result<(EventId, UserId), (u16, &'static str)> {
    let event: EventId = event_raw
        .parse()
        .map_err(|_| (CLOSE_BAD_REQUEST, "invalid event id"))?;

    let token = header
        .as_deref()
        .and_then(bearer_token)
        .map(str::to_string)
        .or(query_token)
        .ok_or((CLOSE_UNAUTHORIZED, "authentication required"))?;

    let user = args
        .accounts
        .authenticate(&token)
        .await
        .map_err(|_| (CLOSE_UNAUTHORIZED, "authentication required"))?;

    let is_participant = args
        .store
        .view(|tables| tables.participant_of(event, user).is_some())
        .await;
    if !is_participant {
        return Err((CLOSE_FORBIDDEN, "not a participant"));
    }

    Ok((event, user))
}

fn handle_typing(
    args: &ApiArgs,
    event: EventId,
    user: UserId,
    user_name: &str,
    envelope: &Envelope,
    last_typing: &mut Option<Instant>,
) {
    let claimed = envelope.payload.get("event_id").and_then(serde_json::Value::as_u64);
    if claimed != Some(event.0) {
        log::debug!("typing frame with mismatched event id from user {}", user);
        return;
    }

    let now = Instant::now();
    if last_typing.map_or(false, |last| now.duration_since(last) < TYPING_RATE_LIMIT) {
        // Over the limit; dropped silently.
        return;
    }
    *last_typing = Some(now);

    args.hub.publish(
        event,
        "chat.typing",
        json!({
            "event_id": event,
            "user_id": user,
            "user_name": user_name,
        }),
        Some(user),
    );
}
