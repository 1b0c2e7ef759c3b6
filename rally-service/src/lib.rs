// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The mutation services of the rally backend.
//!
//! Every service wraps its store writes in a transaction and emits exactly one broadcast
//! envelope per observable change, after the transaction committed. Authorization runs
//! through [`policy`], derived board state through [`progress`], periodic work through
//! [`jobs`].

#![warn(missing_docs)]

pub mod account;
pub mod board;
pub mod chat;
pub mod error;
pub mod event;
pub mod export;
pub mod invite;
pub mod jobs;
pub mod mailer;
pub mod participant;
pub mod poll;
pub mod policy;
pub mod progress;

pub use error::{Error, FieldError};
