// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rejection handling: one recovery point mapping the service error taxonomy to HTTP.

use serde::Serialize;
use warp::{http::StatusCode, reject::Reject, Rejection, Reply};

use std::convert::Infallible;

use rally_service::{Error, FieldError};

/// Wrapper carrying a service error through warp's rejection machinery.
#[derive(Debug)]
pub struct ServiceRejection(pub Error);

impl Reject for ServiceRejection {}

/// Converts a service error into a rejection.
pub fn reject(error: Error) -> Rejection {
    warp::reject::custom(ServiceRejection(error))
}

/// The uniform error body.
#[derive(Serialize)]
struct ErrorBody {
    code: String,
    detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

fn body(code: &str, detail: &str, errors: Vec<FieldError>) -> ErrorBody {
    ErrorBody {
        code: code.to_string(),
        detail: detail.to_string(),
        errors,
    }
}

/// Maps rejections to JSON error responses. Unknown rejections become an opaque 500; nothing
/// of the failure leaks to the client.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, error_body) = if let Some(ServiceRejection(error)) = err.find::<ServiceRejection>() {
        match error {
            Error::Validation { summary, fields } => (
                StatusCode::BAD_REQUEST,
                body("validation", summary, fields.clone()),
            ),
            Error::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                body("unauthorized", "Authentication required.", Vec::new()),
            ),
            Error::Forbidden { code } => (StatusCode::FORBIDDEN, body(code, "Access forbidden.", Vec::new())),
            Error::NotFound { entity } => (
                StatusCode::NOT_FOUND,
                body("not_found", &format!("{} not found.", entity), Vec::new()),
            ),
            Error::Conflict { code } => (StatusCode::CONFLICT, body(code, "Conflicting state.", Vec::new())),
            Error::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                body("rate_limited", "Too many requests, slow down.", Vec::new()),
            ),
            Error::ExporterUnavailable => (
                StatusCode::NOT_IMPLEMENTED,
                body("not_implemented", "This export format is not available.", Vec::new()),
            ),
            Error::Token(detail) => (StatusCode::BAD_REQUEST, body("invalid_token", detail, Vec::new())),
            Error::InviteUnusable { code } => (
                StatusCode::BAD_REQUEST,
                body(code, "The invite cannot be used.", Vec::new()),
            ),
        }
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, body("not_found", "Resource not found.", Vec::new()))
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            body("validation", "Malformed request body.", Vec::new()),
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            body("validation", "Malformed query string.", Vec::new()),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            body("method_not_allowed", "Method not allowed.", Vec::new()),
        )
    } else {
        log::error!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            body("internal", "Unexpected error.", Vec::new()),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&error_body), status))
}
