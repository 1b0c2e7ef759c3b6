// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Profile endpoints of the authenticated caller.

use serde::Deserialize;
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::UserId;
use rally_service::account::ProfileUpdate;

use crate::{auth::authenticated, filters::with_args, rejection, routes::double_option, ApiArgs};

#[derive(Deserialize)]
struct ProfileBody {
    #[serde(default, deserialize_with = "double_option")]
    name: Option<Option<String>>,
    #[serde(default)]
    email_notifications_enabled: Option<bool>,
}

#[derive(Deserialize)]
struct PasswordBody {
    old_password: String,
    new_password: String,
}

fn path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("users")).and(warp::path("me"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let me = path()
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(profile);

    let update = path()
        .and(warp::path::end())
        .and(warp::patch())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(update_profile);

    let password = path()
        .and(warp::path("password"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args))
        .and_then(change_password);

    me.or(update).or(password).boxed()
}

async fn profile(user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let profile = args.accounts.profile(user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&profile))
}

async fn update_profile(user: UserId, body: ProfileBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let profile = args
        .accounts
        .update_profile(
            user,
            ProfileUpdate {
                name: body.name,
                email_notifications_enabled: body.email_notifications_enabled,
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&profile))
}

async fn change_password(user: UserId, body: PasswordBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.accounts
        .change_password(user, &body.old_password, &body.new_password)
        .await
        .map_err(rejection::reject)?;
    Ok(StatusCode::NO_CONTENT)
}
