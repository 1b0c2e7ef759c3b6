// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The broker contract and its implementations.
//!
//! A broker carries named groups (`event:<id>`). Within one group, messages published in
//! sequence by one publisher are observed in that sequence by every subscriber. Delivery is
//! best-effort: a subscriber that falls behind its bounded ring loses the oldest messages,
//! never the newest.

use dashmap::DashMap;
use tokio::sync::broadcast;

use std::sync::Arc;

use crate::envelope::BroadcastMessage;

/// Default capacity of the per-subscriber ring.
pub const DEFAULT_GROUP_CAPACITY: usize = 256;

/// Error publishing to or subscribing on a broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker backend is unreachable.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    /// The message could not be encoded for the transport.
    #[error("encoding broker message failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A live subscription to one group.
pub struct Subscription {
    group: String,
    rx: broadcast::Receiver<BroadcastMessage>,
}

impl Subscription {
    pub(crate) fn new(group: String, rx: broadcast::Receiver<BroadcastMessage>) -> Self {
        Self { group, rx }
    }

    /// The group this subscription listens on.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Receives the next message.
    ///
    /// Returns the message and the number of messages that were dropped because this
    /// subscriber lagged behind its ring (newest-wins overflow). `None` once the group is
    /// gone and drained.
    pub async fn recv(&mut self) -> Option<(BroadcastMessage, u64)> {
        let mut skipped = 0u64;
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some((message, skipped)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    skipped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The pub/sub contract. Implementations must be drop-in for one another.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Subscribes to a group.
    fn subscribe(&self, group: &str) -> Subscription;

    /// Publishes a message to all current subscribers of a group.
    async fn publish(&self, group: &str, message: BroadcastMessage) -> Result<(), BrokerError>;
}

/// Single-process broker: groups are tokio broadcast channels.
pub struct InProcessBroker {
    groups: DashMap<String, broadcast::Sender<BroadcastMessage>>,
    capacity: usize,
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_CAPACITY)
    }
}

impl InProcessBroker {
    /// Creates a broker whose per-subscriber rings hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, group: &str) -> broadcast::Sender<BroadcastMessage> {
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait::async_trait]
impl Broker for InProcessBroker {
    fn subscribe(&self, group: &str) -> Subscription {
        Subscription::new(group.to_string(), self.sender(group).subscribe())
    }

    async fn publish(&self, group: &str, message: BroadcastMessage) -> Result<(), BrokerError> {
        if let Some(tx) = self.groups.get(group) {
            // `send` only errors when nobody listens, which is not a failure here.
            tx.send(message).ok();
        }
        // Drop groups nobody listens on anymore.
        self.groups
            .remove_if(group, |_, tx| tx.receiver_count() == 0);
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_broker::RedisBroker;

#[cfg(feature = "redis")]
mod redis_broker {
    use super::{Broker, BrokerError, Subscription, DEFAULT_GROUP_CAPACITY};
    use crate::envelope::BroadcastMessage;

    use dashmap::DashMap;
    use futures::StreamExt;
    use tokio::sync::broadcast;

    use std::{sync::Arc, time::Duration};

    /// Pattern matching every event group channel.
    const GROUP_PATTERN: &str = "event:*";

    /// Multi-process broker: messages travel over Redis pub/sub, local delivery reuses the
    /// same bounded rings as the in-process broker.
    pub struct RedisBroker {
        client: redis::Client,
        groups: Arc<DashMap<String, broadcast::Sender<BroadcastMessage>>>,
        capacity: usize,
    }

    impl RedisBroker {
        /// Connects to `url` and spawns the background pump that feeds local subscribers.
        pub fn new(url: &str, capacity: Option<usize>) -> Result<Self, BrokerError> {
            let client = redis::Client::open(url).map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            let broker = Self {
                client: client.clone(),
                groups: Arc::new(DashMap::new()),
                capacity: capacity.unwrap_or(DEFAULT_GROUP_CAPACITY),
            };

            let groups = Arc::clone(&broker.groups);
            tokio::spawn(async move {
                loop {
                    match Self::pump(&client, &groups).await {
                        Ok(()) => break,
                        Err(e) => {
                            log::warn!("redis subscription lost, retrying: {}", e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            });

            Ok(broker)
        }

        async fn pump(
            client: &redis::Client,
            groups: &DashMap<String, broadcast::Sender<BroadcastMessage>>,
        ) -> Result<(), redis::RedisError> {
            let mut pubsub = client.get_async_connection().await?.into_pubsub();
            pubsub.psubscribe(GROUP_PATTERN).await?;
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        log::warn!("undecodable payload on `{}`: {}", channel, e);
                        continue;
                    }
                };
                match serde_json::from_slice::<BroadcastMessage>(&payload) {
                    Ok(message) => {
                        if let Some(tx) = groups.get(&channel) {
                            tx.send(message).ok();
                        }
                    }
                    Err(e) => log::warn!("malformed broker message on `{}`: {}", channel, e),
                }
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Broker for RedisBroker {
        fn subscribe(&self, group: &str) -> Subscription {
            let tx = self
                .groups
                .entry(group.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .clone();
            Subscription::new(group.to_string(), tx.subscribe())
        }

        async fn publish(&self, group: &str, message: BroadcastMessage) -> Result<(), BrokerError> {
            let payload = serde_json::to_vec(&message)?;
            let mut con = self
                .client
                .get_async_connection()
                .await
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            redis::cmd("PUBLISH")
                .arg(group)
                .arg(payload)
                .query_async::<_, ()>(&mut con)
                .await
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            Ok(())
        }
    }
}

/// A shared broker handle.
pub type DynBroker = Arc<dyn Broker>;
