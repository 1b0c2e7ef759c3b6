// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Roster endpoints.

use serde::Deserialize;
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::{EventId, ParticipantId, Role, UserId};
use rally_service::participant::RosterOrder;

use crate::{
    auth::authenticated,
    filters::with_args,
    pagination::{paginate, PageQuery},
    path_params,
    rejection,
    ApiArgs,
};

const DEFAULT_PAGE_SIZE: usize = 25;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct RosterQuery {
    #[serde(default)]
    ordering: Option<String>,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
}

#[derive(Deserialize)]
struct RoleBody {
    role: Role,
}

fn path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("events"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let list = path()
        .and(path_params::event_id())
        .and(warp::path("participants"))
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(warp::query::<RosterQuery>())
        .and(with_args(args.clone()))
        .and_then(list);

    let update_role = path()
        .and(path_params::event_id())
        .and(warp::path("participants"))
        .and(path_params::participant_id())
        .and(warp::path::end())
        .and(warp::patch())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(update_role);

    let remove = path()
        .and(path_params::event_id())
        .and(warp::path("participants"))
        .and(path_params::participant_id())
        .and(warp::path::end())
        .and(warp::delete())
        .and(authenticated(args.clone()))
        .and(with_args(args))
        .and_then(remove);

    list.or(update_role).or(remove).boxed()
}

async fn list(event: EventId, user: UserId, query: RosterQuery, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let order = match query.ordering.as_deref() {
        Some("role") => RosterOrder::Role,
        _ => RosterOrder::Name,
    };
    let roster = args
        .participants
        .list(event, user, order)
        .await
        .map_err(rejection::reject)?;
    let page = paginate(
        roster,
        PageQuery {
            page: query.page,
            page_size: query.page_size,
        },
        DEFAULT_PAGE_SIZE,
        MAX_PAGE_SIZE,
    );
    Ok(warp::reply::json(&page))
}

async fn update_role(
    event: EventId,
    participant: ParticipantId,
    user: UserId,
    body: RoleBody,
    args: ApiArgs,
) -> Result<impl Reply, Rejection> {
    let dto = args
        .participants
        .update_role(event, participant, user, body.role)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn remove(event: EventId, participant: ParticipantId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.participants
        .remove(event, participant, user)
        .await
        .map_err(rejection::reject)?;
    Ok(StatusCode::NO_CONTENT)
}
