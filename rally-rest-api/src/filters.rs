// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

use warp::Filter;

use crate::ApiArgs;

pub(crate) fn with_args(args: ApiArgs) -> impl Filter<Extract = (ApiArgs,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || args.clone())
}
