// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The derived progress engine.
//!
//! Progress is a pure function over the board state, memoized in the cache for a short TTL.
//! The board service evicts the entry and broadcasts `progress.invalidate` on every board
//! mutation; correctness never depends on the cache.

use serde_json::json;

use std::time::Duration;

use rally_hub::Hub;
use rally_model::{
    dto::{ProgressCounts, ProgressDto, ProgressListDto},
    EventId, TaskStatus, UserId,
};
use rally_storage::{Cache, Store, Tables};

use crate::{
    error::Error,
    policy::{Action, Viewer},
};

/// TTL of the memoized aggregate.
pub const CACHE_TTL_SECONDS: u64 = 30;

/// Cache key of the progress aggregate of an event.
pub fn cache_key(event: EventId) -> String {
    format!("event:{}:progress:v1", event)
}

/// Read-through access to the memoized progress of events.
#[derive(Clone)]
pub struct ProgressEngine {
    store: Store,
    cache: Cache,
    hub: Hub,
}

impl ProgressEngine {
    /// Creates the engine.
    pub fn new(store: Store, cache: Cache, hub: Hub) -> Self {
        Self { store, cache, hub }
    }

    /// Computes the aggregate over the committed board state of an event.
    pub fn compute(tables: &Tables, event: EventId) -> ProgressDto {
        let mut counts = ProgressCounts::default();
        let mut total_tasks = 0u64;
        let mut by_list = Vec::new();

        for list in tables.task_lists_of_event(event) {
            let mut entry = ProgressListDto {
                list_id: list.id,
                title: list.title.clone(),
                total: 0,
                todo: 0,
                doing: 0,
                done: 0,
            };
            for task in tables.tasks_of_list(list.id) {
                entry.total += 1;
                match task.status {
                    TaskStatus::Todo => entry.todo += 1,
                    TaskStatus::Doing => entry.doing += 1,
                    TaskStatus::Done => entry.done += 1,
                }
            }
            total_tasks += entry.total;
            counts.todo += entry.todo;
            counts.doing += entry.doing;
            counts.done += entry.done;
            by_list.push(entry);
        }

        let percent_done = if total_tasks == 0 {
            0.0
        } else {
            (counts.done as f64 / total_tasks as f64 * 1000.0).round() / 10.0
        };

        ProgressDto {
            event_id: event,
            total_tasks,
            counts,
            percent_done,
            by_list,
            generated_at: rally_common::time::format_rfc3339(&rally_common::time::now_utc()),
            ttl_seconds: CACHE_TTL_SECONDS,
        }
    }

    /// Serves the aggregate for a participant, read-through against the cache.
    pub async fn event_progress(&self, event: EventId, user: UserId) -> Result<ProgressDto, Error> {
        self.store
            .view(|tables| Viewer::resolve(tables, event, user)?.require(Action::View))
            .await?;

        let key = cache_key(event);
        if let Some(bytes) = self.cache.get(&key).await {
            match serde_json::from_slice::<ProgressDto>(&bytes) {
                Ok(dto) => return Ok(dto),
                Err(e) => log::warn!("discarding undecodable progress blob `{}`: {}", key, e),
            }
        }

        let dto = self.store.view(|tables| Self::compute(tables, event)).await;
        if let Ok(bytes) = serde_json::to_vec(&dto) {
            self.cache
                .set(&key, bytes, Duration::from_secs(CACHE_TTL_SECONDS))
                .await;
        }
        Ok(dto)
    }

    /// Evicts the memoized aggregate and tells connected clients to refetch.
    pub async fn invalidate(&self, event: EventId) {
        self.cache.delete(&cache_key(event)).await;
        self.hub.publish(event, "progress.invalidate", json!({}), None);
    }
}
