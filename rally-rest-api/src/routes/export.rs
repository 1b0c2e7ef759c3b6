// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Board export endpoint.

use warp::{filters::BoxedFilter, http::header, Filter, Rejection, Reply};

use rally_model::{EventId, UserId};
use rally_service::export::ExportFormat;

use crate::{auth::authenticated, filters::with_args, path_params, rejection, ApiArgs};

fn path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("events"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    path()
        .and(path_params::event_id())
        .and(warp::path("export"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(with_args(args))
        .and_then(export)
        .boxed()
}

async fn export(event: EventId, format: String, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let format: ExportFormat = format
        .parse()
        .map_err(|_| rejection::reject(rally_service::Error::not_found("export format")))?;
    let file = args
        .exports
        .export_board(event, user, format)
        .await
        .map_err(rejection::reject)?;

    let response = warp::http::Response::builder()
        .header(header::CONTENT_TYPE, file.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.filename),
        )
        .body(file.bytes)
        .map_err(|_| warp::reject::reject())?;
    Ok(response)
}
