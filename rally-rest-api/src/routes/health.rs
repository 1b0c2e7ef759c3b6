// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

use warp::{filters::BoxedFilter, http::StatusCode, Filter, Reply};

use crate::ApiArgs;

pub(crate) fn filter(_args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| StatusCode::OK)
        .boxed()
}
