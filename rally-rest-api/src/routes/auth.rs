// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Registration, confirmation and token endpoints.

use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::dto::ProfileDto;
use rally_service::account::RegisterInput;

use crate::{filters::with_args, rejection, ApiArgs};

#[derive(Deserialize)]
struct RegisterBody {
    email: String,
    password: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct EmailBody {
    email: String,
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh: String,
}

#[derive(Deserialize)]
struct ConfirmQuery {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    access: String,
    refresh: String,
    user: ProfileDto,
}

fn path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("auth"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let register = path()
        .and(warp::path("register"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(register);

    let resend = path()
        .and(warp::path("resend-confirmation"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(resend_confirmation);

    let confirm = path()
        .and(warp::path("confirm"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ConfirmQuery>())
        .and(with_args(args.clone()))
        .and_then(confirm);

    let login = path()
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(login);

    let refresh = path()
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_args(args))
        .and_then(refresh);

    register.or(resend).or(confirm).or(login).or(refresh).boxed()
}

async fn register(body: RegisterBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let profile = args
        .accounts
        .register(RegisterInput {
            email: body.email,
            password: body.password,
            name: body.name,
        })
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&profile), StatusCode::CREATED))
}

async fn resend_confirmation(body: EmailBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.accounts
        .resend_confirmation(&body.email)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&json!({ "message": "sent" })))
}

async fn confirm(query: ConfirmQuery, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| rejection::reject(rally_service::Error::Token("A confirmation token is required.".to_string())))?;
    args.accounts.confirm(&token).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&json!({ "message": "confirmed" })))
}

async fn login(body: LoginBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let (pair, user) = args
        .accounts
        .login(&body.email, &body.password)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&LoginResponse {
        access: pair.access,
        refresh: pair.refresh,
        user,
    }))
}

async fn refresh(body: RefreshBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let pair = args.accounts.refresh(&body.refresh).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&json!({ "access": pair.access, "refresh": pair.refresh })))
}
