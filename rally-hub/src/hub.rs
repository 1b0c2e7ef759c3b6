// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The process-wide broadcast hub.
//!
//! [`Hub::publish`] is synchronous and never blocks: messages land on a bounded queue that a
//! single forwarder task drains into the broker. Services call it from their post-commit
//! hook, which makes the queue order equal the commit order; the forwarder preserves it all
//! the way to the subscribers. A full queue or a broker failure costs a live update, never
//! the committed mutation it announces.

use serde_json::Value;
use tokio::sync::mpsc;

use std::sync::Arc;

use rally_model::{EventId, UserId};

use crate::{
    broker::{Broker, Subscription},
    envelope::BroadcastMessage,
    metrics::HubMetrics,
};

/// Capacity of the publish queue between services and the forwarder.
const PUBLISH_QUEUE_CAPACITY: usize = 1024;

/// Shared handle used by services and the gateway; cheap to clone.
#[derive(Clone)]
pub struct Hub {
    broker: Arc<dyn Broker>,
    metrics: Arc<HubMetrics>,
    queue: mpsc::Sender<(String, BroadcastMessage)>,
}

impl Hub {
    /// Creates a hub on top of a broker and spawns its forwarder task.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        let metrics = Arc::new(HubMetrics::new());
        let (queue, mut rx) = mpsc::channel::<(String, BroadcastMessage)>(PUBLISH_QUEUE_CAPACITY);

        let forwarder_broker = Arc::clone(&broker);
        let forwarder_metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            while let Some((group, message)) = rx.recv().await {
                let message_type = message.message_type.clone();
                match forwarder_broker.publish(&group, message).await {
                    Ok(()) => forwarder_metrics.message_published(),
                    Err(e) => log::warn!("dropping `{}` broadcast for `{}`: {}", message_type, group, e),
                }
            }
        });

        Self {
            broker,
            metrics,
            queue,
        }
    }

    /// The broker group name of an event.
    pub fn group_name(event_id: EventId) -> String {
        format!("event:{}", event_id)
    }

    /// Subscribes to the group of an event.
    pub fn subscribe(&self, event_id: EventId) -> Subscription {
        self.broker.subscribe(&Self::group_name(event_id))
    }

    /// Queues a broadcast for every subscriber of an event.
    ///
    /// Never blocks and never fails the caller: when the queue is full the message is
    /// counted as dropped and the committed mutation it announces stands either way.
    pub fn publish(&self, event_id: EventId, message_type: &str, payload: Value, sender_id: Option<UserId>) {
        let message = BroadcastMessage::new(message_type, payload, sender_id);
        if self.queue.try_send((Self::group_name(event_id), message)).is_err() {
            self.metrics.messages_dropped(1);
            log::warn!("publish queue full, dropping `{}` for event {}", message_type, event_id);
        }
    }

    /// The counters of the realtime fabric.
    pub fn metrics(&self) -> Arc<HubMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use std::time::Duration;

    use crate::broker::InProcessBroker;

    #[tokio::test]
    async fn publish_reaches_the_event_group() {
        let hub = Hub::new(Arc::new(InProcessBroker::default()));
        let mut sub = hub.subscribe(EventId(5));

        hub.publish(EventId(5), "progress.invalidate", json!({}), None);

        let (message, _) = tokio::time::timeout(Duration::from_millis(250), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.message_type, "progress.invalidate");
    }

    #[tokio::test]
    async fn queued_order_is_delivery_order() {
        let hub = Hub::new(Arc::new(InProcessBroker::default()));
        let mut sub = hub.subscribe(EventId(1));

        for i in 0..20 {
            hub.publish(EventId(1), "task.updated", json!({ "i": i }), None);
        }

        for i in 0..20 {
            let (message, _) = tokio::time::timeout(Duration::from_millis(250), sub.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(message.payload["i"], i);
        }
    }

    #[test]
    fn group_name_carries_the_event_id() {
        assert_eq!(Hub::group_name(EventId(17)), "event:17");
    }
}
