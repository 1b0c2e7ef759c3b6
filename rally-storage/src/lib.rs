// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The transactional store and the advisory cache layer of the rally backend.
//!
//! The [`store::Store`] is the single source of truth; the [`cache::Cache`] is advisory and
//! never propagates backend failures to its callers.

#![warn(missing_docs)]

pub mod cache;
pub mod store;

pub use cache::{Cache, CacheBackend, CacheError};
pub use store::{Store, Tables};
