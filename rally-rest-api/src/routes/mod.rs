// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Route modules, one per resource, combined into the full filter.

pub mod auth;
pub mod board;
pub mod chat;
pub mod events;
pub mod export;
pub mod health;
pub mod invites;
pub mod participants;
pub mod polls;
pub mod users;

use serde::{Deserialize, Deserializer};
use warp::{filters::BoxedFilter, Filter, Reply};

use crate::{ws, ApiArgs};

/// Combines every route of the surface, the WebSocket gateway included.
pub fn filter_all(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    health::filter(args.clone())
        .or(auth::filter(args.clone()))
        .or(users::filter(args.clone()))
        .or(events::filter(args.clone()))
        .or(board::filter(args.clone()))
        .or(polls::filter(args.clone()))
        .or(chat::filter(args.clone()))
        .or(invites::filter(args.clone()))
        .or(participants::filter(args.clone()))
        .or(export::filter(args.clone()))
        .or(ws::filter(args))
        .boxed()
}

/// Deserializes a field that distinguishes "absent" from "null": absent stays `None` via
/// `#[serde(default)]`, an explicit `null` becomes `Some(None)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// [`double_option`] for RFC 3339 timestamps.
pub(crate) fn double_option_rfc3339<'de, D>(
    deserializer: D,
) -> Result<Option<Option<time::OffsetDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(Some(None)),
        Some(value) => rally_common::time::parse_rfc3339(&value)
            .map(|t| Some(Some(t)))
            .map_err(serde::de::Error::custom),
    }
}
