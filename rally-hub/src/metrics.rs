// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Counters kept by the hub and the gateway.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters of the realtime fabric.
#[derive(Debug, Default)]
pub struct HubMetrics {
    active_connections: AtomicU64,
    ws_dropped_messages: AtomicU64,
    published_messages: AtomicU64,
}

impl HubMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new WebSocket connection.
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Unregisters a WebSocket connection.
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of currently connected WebSocket clients.
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Records `n` messages dropped on a lagging or oversized connection.
    pub fn messages_dropped(&self, n: u64) {
        self.ws_dropped_messages.fetch_add(n, Ordering::Relaxed);
    }

    /// Total number of dropped outbound messages.
    pub fn dropped_messages(&self) -> u64 {
        self.ws_dropped_messages.load(Ordering::Relaxed)
    }

    /// Records a published broadcast.
    pub fn message_published(&self) {
        self.published_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Total number of published broadcasts.
    pub fn published_messages(&self) -> u64 {
        self.published_messages.load(Ordering::Relaxed)
    }
}
