// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Events CRUD and the derived progress endpoint.

use serde::Deserialize;
use time::OffsetDateTime;
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::{EventId, UserId};
use rally_service::event::{EventInput, EventUpdate};

use crate::{
    auth::authenticated,
    filters::with_args,
    pagination::{paginate, PageQuery},
    path_params,
    rejection,
    routes::double_option_rfc3339,
    ApiArgs,
};

const DEFAULT_PAGE_SIZE: usize = 25;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct EventBody {
    title: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    start_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    end_at: Option<OffsetDateTime>,
}

#[derive(Deserialize)]
struct EventPatchBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, deserialize_with = "double_option_rfc3339")]
    start_at: Option<Option<OffsetDateTime>>,
    #[serde(default, deserialize_with = "double_option_rfc3339")]
    end_at: Option<Option<OffsetDateTime>>,
}

fn path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("events"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let list = path()
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(warp::query::<PageQuery>())
        .and(with_args(args.clone()))
        .and_then(list);

    let create = path()
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(create);

    let get = path()
        .and(path_params::event_id())
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(get);

    let update = path()
        .and(path_params::event_id())
        .and(warp::path::end())
        .and(warp::patch())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(update);

    let delete = path()
        .and(path_params::event_id())
        .and(warp::path::end())
        .and(warp::delete())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(delete);

    let progress = path()
        .and(path_params::event_id())
        .and(warp::path("progress"))
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(with_args(args))
        .and_then(progress);

    list.or(create).or(get).or(update).or(delete).or(progress).boxed()
}

async fn list(user: UserId, query: PageQuery, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let events = args.events.list_for_user(user).await;
    Ok(warp::reply::json(&paginate(events, query, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)))
}

async fn create(user: UserId, body: EventBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .events
        .create(
            user,
            EventInput {
                title: body.title,
                category: body.category.unwrap_or_default(),
                description: body.description.unwrap_or_default(),
                location: body.location.unwrap_or_default(),
                start_at: body.start_at,
                end_at: body.end_at,
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&dto), StatusCode::CREATED))
}

async fn get(event: EventId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args.events.get(event, user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn update(event: EventId, user: UserId, body: EventPatchBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .events
        .update(
            event,
            user,
            EventUpdate {
                title: body.title,
                category: body.category,
                description: body.description,
                location: body.location,
                start_at: body.start_at,
                end_at: body.end_at,
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn delete(event: EventId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.events.delete(event, user).await.map_err(rejection::reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn progress(event: EventId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args.progress.event_progress(event, user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}
