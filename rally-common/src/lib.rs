// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! A crate that provides functionalities shared across the crates of the rally backend: the
//! logger backend, time helpers, token and password primitives and task management.

#![warn(missing_docs)]

pub mod auth;
pub mod logger;
pub mod task;
pub mod time;
