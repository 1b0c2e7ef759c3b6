// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bearer-token authentication for HTTP requests.
//!
//! WebSocket handshakes additionally accept a `?token=` query parameter, handled in
//! [`crate::ws`]; plain HTTP requests carry the token in the `Authorization` header only.

use warp::{Filter, Rejection};

use rally_model::UserId;
use rally_service::Error;

use crate::{filters::with_args, rejection, ApiArgs};

/// Extracts the token from an `Authorization: Bearer …` header value.
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token)
}

/// Filter resolving the calling user from the `Authorization` header.
///
/// Rejects with 401 when the header is missing, malformed, expired or names an inactive
/// account.
pub(crate) fn authenticated(args: ApiArgs) -> impl Filter<Extract = (UserId,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_args(args))
        .and_then(|header: Option<String>, args: ApiArgs| async move {
            let token = header
                .as_deref()
                .and_then(bearer_token)
                .ok_or_else(|| rejection::reject(Error::Unauthorized))?;
            args.accounts
                .authenticate(token)
                .await
                .map_err(rejection::reject)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
