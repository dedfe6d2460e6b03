// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Cache facade for Bedrock services.
//!
//! Values are strings stored under string keys with an expiration time.  Backends implement the
//! `CacheStore` trait and the `Cache` facade layers the defaults and the cache-aside `remember`
//! helper on top of them.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use async_trait::async_trait;
use bedrock_core::config::{CacheDriver, CacheSettings, RedisSettings};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

mod chain;
pub use chain::ChainStore;
mod memory;
pub use memory::MemoryStore;
mod redis;
pub use crate::redis::RedisStore;
#[cfg(test)]
mod tests;

/// Cache errors.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CacheError {
    /// Indicates that the key is not in the cache or has expired.
    #[error("Cache miss")]
    Miss,

    /// Indicates that reading from the backend failed.
    #[error("Cache get failed: {0}")]
    GetFailed(String),

    /// Indicates that writing to the backend failed.
    #[error("Cache set failed: {0}")]
    SetFailed(String),

    /// Catch-all error type for unexpected backend errors.
    #[error("Cache backend error: {0}")]
    BackendError(String),

    /// Indicates that the backend cannot be created from the given settings.
    #[error("Invalid cache configuration: {0}")]
    ConfigError(String),
}

/// Result type for this crate.
pub type CacheResult<T> = Result<T, CacheError>;

/// Operations that every cache backend provides.
#[async_trait]
pub trait CacheStore {
    /// Returns a short name for the backend to use in logs.
    fn name(&self) -> &'static str;

    /// Gets the value of `key`, returning `CacheError::Miss` if absent.
    async fn get(&self, key: &str) -> CacheResult<String>;

    /// Sets `key` to `value` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Deletes `key`.  Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Returns the time `key` has left to live, or `None` if it never expires.
    ///
    /// Returns `CacheError::Miss` if the key is absent.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Deletes all keys in the backend's namespace.
    async fn clear(&self) -> CacheResult<()>;
}

/// Entry point to the cache for business logic.
#[derive(Clone)]
pub struct Cache {
    /// Backend holding the entries.
    store: Arc<dyn CacheStore + Send + Sync>,

    /// Expiration applied to entries stored with a zero TTL.
    default_ttl: Duration,
}

impl Cache {
    /// Creates a cache facade over `store`.
    pub fn new(store: Arc<dyn CacheStore + Send + Sync>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Returns the TTL to apply when the caller asked for `ttl`.
    fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() { self.default_ttl } else { ttl }
    }

    /// Gets the value of `key`.
    pub async fn get(&self, key: &str) -> CacheResult<String> {
        self.store.get(key).await
    }

    /// Sets `key` to `value` for `ttl`, or for the default TTL if `ttl` is zero.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.store.set(key, value, self.effective_ttl(ttl)).await
    }

    /// Deletes `key`.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store.delete(key).await
    }

    /// Checks if `key` is present.
    ///
    /// This fetches the whole value, so prefer `get` when the value is needed afterwards.  Backend
    /// failures are reported as absence.
    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_ok()
    }

    /// Returns the value of `key`, computing and storing it with `compute` if it cannot be read.
    ///
    /// Any read error, not only a miss, triggers the computation.  Failing to store the computed
    /// value is logged and otherwise ignored.  If `compute` fails, its error is returned as is and
    /// nothing is stored.
    pub async fn remember<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        match self.get(key).await {
            Ok(value) => return Ok(value),
            Err(CacheError::Miss) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Cache read for {} failed; recomputing: {}", key, e),
        }

        let value = compute().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!("Cannot store {} in the cache: {}", key, e);
        }
        Ok(value)
    }

    /// Deletes all entries.
    pub async fn clear(&self) -> CacheResult<()> {
        self.store.clear().await
    }
}

/// Creates the cache backend selected by `settings`, connecting to Redis if needed.
pub async fn connect(settings: &CacheSettings, redis: &RedisSettings) -> CacheResult<Cache> {
    if settings.ttl == 0 {
        return Err(CacheError::ConfigError("ttl must be positive".to_owned()));
    }

    let store: Arc<dyn CacheStore + Send + Sync> = match settings.driver {
        CacheDriver::Memory => Arc::new(MemoryStore::with_janitor(memory::JANITOR_INTERVAL)),
        CacheDriver::Redis => Arc::new(RedisStore::connect(redis).await?),
        CacheDriver::Chain => {
            let tiers: Vec<Arc<dyn CacheStore + Send + Sync>> = vec![
                Arc::new(MemoryStore::with_janitor(memory::JANITOR_INTERVAL)),
                Arc::new(RedisStore::connect(redis).await?),
            ];
            Arc::new(ChainStore::new(tiers, settings.default_ttl())?)
        }
    };
    debug!("Using {} cache with a default TTL of {}s", store.name(), settings.ttl);
    Ok(Cache::new(store, settings.default_ttl()))
}

/// Test utilities.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::sync::Mutex;

    /// A store that fails every operation, for testing error paths.
    #[derive(Default)]
    pub struct BrokenStore {
        /// Keys passed to `set`, to verify that writes were attempted.
        pub set_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CacheStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn get(&self, _key: &str) -> CacheResult<String> {
            Err(CacheError::GetFailed("backend is down".to_owned()))
        }

        async fn set(&self, key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            self.set_calls.lock().unwrap().push(key.to_owned());
            Err(CacheError::SetFailed("backend is down".to_owned()))
        }

        async fn delete(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::BackendError("backend is down".to_owned()))
        }

        async fn ttl(&self, _key: &str) -> CacheResult<Option<Duration>> {
            Err(CacheError::GetFailed("backend is down".to_owned()))
        }

        async fn clear(&self) -> CacheResult<()> {
            Err(CacheError::BackendError("backend is down".to_owned()))
        }
    }

    /// Creates a cache backed by a fresh memory store.
    pub fn memory_cache(default_ttl: Duration) -> Cache {
        Cache::new(Arc::new(MemoryStore::default()), default_ttl)
    }
}
