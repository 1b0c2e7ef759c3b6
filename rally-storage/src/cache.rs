// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! A keyed byte-blob cache with TTL.
//!
//! The cache is advisory: correctness never depends on it. A remote backend (Redis in
//! production) may be plugged in; when it errors, the layer falls back to an in-process map
//! with TTL and never propagates the failure to its callers.

use parking_lot::Mutex;

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Capacity of the in-process fallback map.
const FALLBACK_CAPACITY: usize = 4096;

/// Error of a remote cache backend.
#[derive(Debug, thiserror::Error)]
#[error("cache backend error: {0}")]
pub struct CacheError(pub String);

/// A remote keyed byte-blob store with TTL.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetches the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    /// Removes `key`.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct FallbackEntry {
    value: Vec<u8>,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct FallbackMap {
    entries: HashMap<String, FallbackEntry>,
    clock: u64,
}

impl FallbackMap {
    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.clock += 1;
        let clock = self.clock;
        match self.entries.get_mut(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.last_used = clock;
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&mut self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.clock += 1;
        if self.entries.len() >= FALLBACK_CAPACITY && !self.entries.contains_key(key) {
            self.evict_one();
        }
        self.entries.insert(
            key.to_string(),
            FallbackEntry {
                value,
                expires_at: Instant::now() + ttl,
                last_used: self.clock,
            },
        );
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn evict_one(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        if self.entries.len() >= FALLBACK_CAPACITY {
            if let Some(key) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&key);
            }
        }
    }
}

/// The failure-tolerant cache layer.
#[derive(Clone)]
pub struct Cache {
    remote: Option<Arc<dyn CacheBackend>>,
    fallback: Arc<Mutex<FallbackMap>>,
}

impl Cache {
    /// Creates a cache without a remote backend; entries live in the in-process map only.
    pub fn in_process() -> Self {
        Self {
            remote: None,
            fallback: Arc::new(Mutex::new(FallbackMap::default())),
        }
    }

    /// Creates a cache backed by a remote store, retaining the in-process fallback.
    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            remote: Some(backend),
            fallback: Arc::new(Mutex::new(FallbackMap::default())),
        }
    }

    /// Fetches the blob stored under `key`. Backend failures degrade to the fallback map.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(remote) = &self.remote {
            match remote.get(key).await {
                Ok(value) => return value,
                Err(e) => log::warn!("cache get failed for `{}`, using fallback: {}", key, e),
            }
        }
        self.fallback.lock().get(key)
    }

    /// Stores `value` under `key` for `ttl`. Backend failures degrade to the fallback map.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        if let Some(remote) = &self.remote {
            match remote.set(key, value.clone(), ttl).await {
                Ok(()) => {
                    // The remote copy is authoritative again.
                    self.fallback.lock().delete(key);
                    return;
                }
                Err(e) => log::warn!("cache set failed for `{}`, using fallback: {}", key, e),
            }
        }
        self.fallback.lock().set(key, value, ttl);
    }

    /// Removes `key` from the remote backend and the fallback map.
    pub async fn delete(&self, key: &str) {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(key).await {
                log::warn!("cache delete failed for `{}`: {}", key, e);
            }
        }
        self.fallback.lock().delete(key);
    }
}

#[cfg(feature = "redis")]
pub use self::redis_backend::RedisCache;

#[cfg(feature = "redis")]
mod redis_backend {
    use super::{CacheBackend, CacheError};

    use redis::AsyncCommands;

    use std::time::Duration;

    /// Cache backend talking to a Redis instance.
    pub struct RedisCache {
        client: redis::Client,
    }

    impl RedisCache {
        /// Creates a backend for the given Redis URL.
        pub fn new(url: &str) -> Result<Self, CacheError> {
            let client = redis::Client::open(url).map_err(|e| CacheError(e.to_string()))?;
            Ok(Self { client })
        }

        async fn connection(&self) -> Result<redis::aio::Connection, CacheError> {
            self.client
                .get_async_connection()
                .await
                .map_err(|e| CacheError(e.to_string()))
        }
    }

    #[async_trait::async_trait]
    impl CacheBackend for RedisCache {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            let mut con = self.connection().await?;
            con.get(key).await.map_err(|e| CacheError(e.to_string()))
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
            let mut con = self.connection().await?;
            con.set_ex(key, value, ttl.as_secs() as usize)
                .await
                .map_err(|e| CacheError(e.to_string()))
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            let mut con = self.connection().await?;
            con.del(key).await.map_err(|e| CacheError(e.to_string()))
        }
    }
}
