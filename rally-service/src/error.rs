// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy of the service layer.
//!
//! Validation and authorization errors surface to the caller; infrastructure errors on
//! advisory paths (cache, broker) are swallowed where they occur and never reach this type.

use thiserror::Error;

/// A single per-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// Name of the offending input field.
    pub field: String,
    /// Human-readable message.
    pub message: String,
}

/// Error returned by the service layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input or a constraint violation; maps to HTTP 400.
    #[error("{summary}")]
    Validation {
        /// One-line summary of the failure.
        summary: String,
        /// Per-field details.
        fields: Vec<FieldError>,
    },
    /// Missing or invalid credentials, or an inactive account; maps to HTTP 401.
    #[error("authentication required")]
    Unauthorized,
    /// A role-gated operation attempted by a lesser role; maps to HTTP 403.
    #[error("access forbidden: {code}")]
    Forbidden {
        /// Machine-readable reason, e.g. `forbidden` or `last_organizer`.
        code: &'static str,
    },
    /// The target id does not resolve; maps to HTTP 404.
    #[error("{entity} not found")]
    NotFound {
        /// The entity kind that was looked up.
        entity: &'static str,
    },
    /// Race-loss on unique or conditional state; maps to HTTP 409.
    #[error("conflict: {code}")]
    Conflict {
        /// Machine-readable reason, e.g. `already_assigned`.
        code: &'static str,
    },
    /// The caller exceeded a rate limit; maps to HTTP 429.
    #[error("rate limited")]
    RateLimited,
    /// The requested exporter was not resolved at startup; maps to HTTP 501.
    #[error("exporter not available")]
    ExporterUnavailable,
    /// A bad or expired confirmation token; maps to HTTP 400.
    #[error("{0}")]
    Token(String),
    /// An invite that cannot be accepted; maps to HTTP 400 carrying the status as machine
    /// code (`revoked`, `expired`, `exhausted`).
    #[error("invite {code}")]
    InviteUnusable {
        /// The derived invite status.
        code: &'static str,
    },
}

impl Error {
    /// A validation error on a single field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Validation {
            summary: message.clone(),
            fields: vec![FieldError {
                field: field.into(),
                message,
            }],
        }
    }

    /// A validation error without a specific field.
    pub fn invalid(summary: impl Into<String>) -> Self {
        Self::Validation {
            summary: summary.into(),
            fields: Vec::new(),
        }
    }

    /// The generic role-gate denial.
    pub fn forbidden() -> Self {
        Self::Forbidden { code: "forbidden" }
    }

    /// A not-found error for the given entity kind.
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }
}
