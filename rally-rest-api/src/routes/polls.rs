// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Poll endpoints: lifecycle and voting.

use serde::Deserialize;
use time::{Date, OffsetDateTime};
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::{EventId, PollId, PollKind, PollOptionId, UserId};
use rally_service::poll::{PollInput, PollOptionInput};

use crate::{
    auth::authenticated,
    filters::with_args,
    pagination::{paginate, PageQuery},
    path_params,
    rejection,
    ApiArgs,
};

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 50;

#[derive(Deserialize)]
struct PollOptionBody {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    date_value: Option<Date>,
}

#[derive(Deserialize)]
struct PollBody {
    #[serde(rename = "type")]
    kind: PollKind,
    question: String,
    #[serde(default)]
    multiple: bool,
    #[serde(default = "default_allow_change_vote")]
    allow_change_vote: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    end_at: Option<OffsetDateTime>,
    options: Vec<PollOptionBody>,
}

fn default_allow_change_vote() -> bool {
    true
}

#[derive(Deserialize)]
struct VoteBody {
    option_ids: Vec<PollOptionId>,
}

#[derive(Deserialize)]
struct PollListQuery {
    #[serde(default)]
    is_closed: Option<String>,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
}

fn events_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("events"))
}

fn polls_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("polls"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let list = events_path()
        .and(path_params::event_id())
        .and(warp::path("polls"))
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(warp::query::<PollListQuery>())
        .and(with_args(args.clone()))
        .and_then(list);

    let create = events_path()
        .and(path_params::event_id())
        .and(warp::path("polls"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(create);

    let get = polls_path()
        .and(path_params::poll_id())
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(get);

    let delete = polls_path()
        .and(path_params::poll_id())
        .and(warp::path::end())
        .and(warp::delete())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(delete);

    let vote = polls_path()
        .and(path_params::poll_id())
        .and(warp::path("vote"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(vote);

    let close = polls_path()
        .and(path_params::poll_id())
        .and(warp::path("close"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(with_args(args))
        .and_then(close);

    list.or(create).or(get).or(delete).or(vote).or(close).boxed()
}

fn parse_is_closed(raw: Option<&str>) -> Option<bool> {
    match raw?.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

async fn list(event: EventId, user: UserId, query: PollListQuery, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let polls = args
        .polls
        .list(event, user, parse_is_closed(query.is_closed.as_deref()))
        .await
        .map_err(rejection::reject)?;
    let page = paginate(
        polls,
        PageQuery {
            page: query.page,
            page_size: query.page_size,
        },
        DEFAULT_PAGE_SIZE,
        MAX_PAGE_SIZE,
    );
    Ok(warp::reply::json(&page))
}

async fn create(event: EventId, user: UserId, body: PollBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .polls
        .create(
            user,
            PollInput {
                event,
                kind: body.kind,
                question: body.question,
                multiple: body.multiple,
                allow_change_vote: body.allow_change_vote,
                end_at: body.end_at,
                options: body
                    .options
                    .into_iter()
                    .map(|o| PollOptionInput {
                        label: o.label,
                        date_value: o.date_value,
                    })
                    .collect(),
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&dto), StatusCode::CREATED))
}

async fn get(poll: PollId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args.polls.get(poll, user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn delete(poll: PollId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.polls.delete(poll, user).await.map_err(rejection::reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vote(poll: PollId, user: UserId, body: VoteBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .polls
        .vote(poll, user, body.option_ids)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn close(poll: PollId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args.polls.close(poll, user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}
