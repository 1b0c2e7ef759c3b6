// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chat endpoints.

use serde::Deserialize;
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::{EventId, MessageId, UserId};
use rally_service::chat::MessageCursor;

use crate::{auth::authenticated, filters::with_args, path_params, rejection, ApiArgs};

#[derive(Deserialize)]
struct MessageBody {
    text: String,
}

#[derive(Deserialize)]
struct MessageListQuery {
    #[serde(default)]
    before_id: Option<MessageId>,
    #[serde(default)]
    after_id: Option<MessageId>,
    #[serde(default)]
    page_size: Option<usize>,
}

fn events_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("events"))
}

fn messages_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("messages"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let list = events_path()
        .and(path_params::event_id())
        .and(warp::path("messages"))
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(warp::query::<MessageListQuery>())
        .and(with_args(args.clone()))
        .and_then(list);

    let send = events_path()
        .and(path_params::event_id())
        .and(warp::path("messages"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(send);

    let edit = messages_path()
        .and(path_params::message_id())
        .and(warp::path::end())
        .and(warp::patch())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(edit);

    let delete = messages_path()
        .and(path_params::message_id())
        .and(warp::path::end())
        .and(warp::delete())
        .and(authenticated(args.clone()))
        .and(with_args(args))
        .and_then(delete);

    list.or(send).or(edit).or(delete).boxed()
}

async fn list(event: EventId, user: UserId, query: MessageListQuery, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let messages = args
        .chat
        .list(
            event,
            user,
            MessageCursor {
                before_id: query.before_id,
                after_id: query.after_id,
                page_size: query.page_size,
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&messages))
}

async fn send(event: EventId, user: UserId, body: MessageBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .chat
        .send(event, user, &body.text)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&dto), StatusCode::CREATED))
}

async fn edit(message: MessageId, user: UserId, body: MessageBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .chat
        .edit(message, user, &body.text)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn delete(message: MessageId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.chat.delete(message, user).await.map_err(rejection::reject)?;
    Ok(StatusCode::NO_CONTENT)
}
