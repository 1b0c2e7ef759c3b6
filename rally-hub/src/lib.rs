// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The pub/sub substrate of the rally backend.
//!
//! Services publish through the [`hub::Hub`], connections subscribe to their event group
//! through the same handle. The [`broker::Broker`] implementations are drop-in: an in-process
//! fan-out for development and tests, a Redis-backed one for multi-process deployments.

#![warn(missing_docs)]

pub mod broker;
pub mod envelope;
pub mod hub;
pub mod metrics;

pub use broker::{Broker, BrokerError, InProcessBroker, Subscription};
pub use envelope::{BroadcastMessage, Envelope};
pub use hub::Hub;
pub use metrics::HubMetrics;

#[cfg(feature = "redis")]
pub use broker::RedisBroker;
