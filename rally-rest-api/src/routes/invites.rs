// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Invite endpoints.

use serde::Deserialize;
use serde_json::json;
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::{EventId, UserId};
use rally_service::invite::{AcceptOutcome, InviteInput};

use crate::{auth::authenticated, filters::with_args, path_params, rejection, ApiArgs};

#[derive(Deserialize)]
struct InviteBody {
    expires_in_hours: i64,
    #[serde(default)]
    max_uses: u32,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: Option<String>,
}

fn events_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("events"))
}

fn invites_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("invites"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let create = events_path()
        .and(path_params::event_id())
        .and(warp::path("invites"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(create);

    let validate = invites_path()
        .and(warp::path("validate"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<TokenQuery>())
        .and(with_args(args.clone()))
        .and_then(validate);

    let accept = invites_path()
        .and(warp::path("accept"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(accept);

    let revoke = invites_path()
        .and(warp::path("revoke"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args))
        .and_then(revoke);

    create.or(validate).or(accept).or(revoke).boxed()
}

async fn create(event: EventId, user: UserId, body: InviteBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .invites
        .create(
            event,
            user,
            InviteInput {
                expires_in_hours: body.expires_in_hours,
                max_uses: body.max_uses,
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&dto), StatusCode::CREATED))
}

async fn validate(query: TokenQuery, args: ApiArgs) -> Result<impl Reply, Rejection> {
    // Unknown and missing tokens are a regular answer here, never an error.
    let dto = args.invites.validate(query.token.as_deref()).await;
    Ok(warp::reply::json(&dto))
}

async fn accept(user: UserId, body: TokenBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let token = body.token.unwrap_or_default();
    let outcome = args.invites.accept(&token, user).await.map_err(rejection::reject)?;
    match outcome {
        AcceptOutcome::Joined(event) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "message": "joined", "event_id": event })),
            StatusCode::CREATED,
        )),
        AcceptOutcome::AlreadyMember(_) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "message": "already_member" })),
            StatusCode::OK,
        )),
    }
}

async fn revoke(user: UserId, body: TokenBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let token = body.token.unwrap_or_default();
    args.invites.revoke(&token, user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&json!({ "message": "revoked" })))
}
