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

//! Multi-tier cache backend.

use crate::{CacheError, CacheResult, CacheStore};
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use std::time::Duration;

/// Cache backend that layers several stores, fastest first.
///
/// Writes go to every tier.  Reads go through the tiers in order until one has the key, and a hit
/// in a slower tier is copied into all the faster ones with the remaining TTL that the slower tier
/// reports.
pub struct ChainStore {
    /// The tiers, fastest first.
    tiers: Vec<Arc<dyn CacheStore + Send + Sync>>,

    /// TTL used when copying entries that do not expire in the tier they were found in.
    default_ttl: Duration,
}

impl ChainStore {
    /// Creates a new chain over `tiers`.
    pub fn new(
        tiers: Vec<Arc<dyn CacheStore + Send + Sync>>,
        default_ttl: Duration,
    ) -> CacheResult<Self> {
        if tiers.is_empty() {
            return Err(CacheError::ConfigError("A cache chain needs at least one tier".to_owned()));
        }
        Ok(Self { tiers, default_ttl })
    }

    /// Copies `key` with `value` into the tiers that are faster than `found_at`.
    async fn backfill(&self, key: &str, value: &str, found_at: usize) {
        let ttl = match self.tiers[found_at].ttl(key).await {
            Ok(Some(ttl)) => ttl,
            Ok(None) | Err(_) => self.default_ttl,
        };
        for tier in &self.tiers[..found_at] {
            if let Err(e) = tier.set(key, value, ttl).await {
                warn!("Cannot backfill {} into the {} cache: {}", key, tier.name(), e);
            }
        }
    }
}

#[async_trait]
impl CacheStore for ChainStore {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn get(&self, key: &str) -> CacheResult<String> {
        let mut last_error = CacheError::Miss;
        for (i, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(value) => {
                    if i > 0 {
                        self.backfill(key, &value, i).await;
                    }
                    return Ok(value);
                }
                Err(CacheError::Miss) => (),
                Err(e) => {
                    warn!("Read of {} from the {} cache failed: {}", key, tier.name(), e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut result = Ok(());
        for tier in &self.tiers {
            if let Err(e) = tier.set(key, value, ttl).await {
                warn!("Write of {} to the {} cache failed: {}", key, tier.name(), e);
                result = Err(e);
            }
        }
        result
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut result = Ok(());
        for tier in &self.tiers {
            if let Err(e) = tier.delete(key).await {
                warn!("Delete of {} from the {} cache failed: {}", key, tier.name(), e);
                result = Err(e);
            }
        }
        result
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut last_error = CacheError::Miss;
        for tier in &self.tiers {
            match tier.ttl(key).await {
                Ok(ttl) => return Ok(ttl),
                Err(CacheError::Miss) => (),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut result = Ok(());
        for tier in &self.tiers {
            if let Err(e) = tier.clear().await {
                warn!("Clear of the {} cache failed: {}", tier.name(), e);
                result = Err(e);
            }
        }
        result
    }
}
