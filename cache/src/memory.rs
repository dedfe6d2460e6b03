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

//! Process-local cache backend.

use crate::{CacheError, CacheResult, CacheStore};
use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// How often the janitor sweeps expired entries out of stores created by `connect`.
pub(crate) const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// A cached value and its expiration time.
struct Entry {
    /// The cached value.
    value: String,

    /// Time after which the entry is gone, or `None` if it never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    /// Checks if the entry has expired as of `now`.
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Cache backend that keeps entries in a concurrent hash map.
///
/// Expired entries are dropped lazily when they are accessed and, if the store was created with
/// `with_janitor`, periodically by a background task.
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// The cached entries.
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    /// Creates a new store with a background task that removes expired entries every `interval`.
    ///
    /// The task stops once the last clone of the store is dropped.  Must be called from within a
    /// tokio runtime.
    pub fn with_janitor(interval: Duration) -> Self {
        let store = Self::default();
        let entries = Arc::downgrade(&store.entries);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !sweep(&entries) {
                    break;
                }
            }
        });
        store
    }

    /// Returns the number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes expired entries from the map behind `entries`.
///
/// Returns false if the map is gone.
fn sweep(entries: &Weak<DashMap<String, Entry>>) -> bool {
    let Some(entries) = entries.upgrade() else {
        return false;
    };
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    let removed = before.saturating_sub(entries.len());
    if removed > 0 {
        debug!("Swept {} expired cache entries", removed);
    }
    true
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Err(CacheError::Miss)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let expires_at = if ttl.is_zero() { None } else { Some(Instant::now() + ttl) };
        self.entries.insert(key.to_owned(), Entry { value: value.to_owned(), expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                Ok(entry.expires_at.map(|expires_at| expires_at.duration_since(now)))
            }
            _ => Err(CacheError::Miss),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }
}
