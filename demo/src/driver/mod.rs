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

//! Business logic for the service.

use crate::db::DemoRepository;
use crate::model::Demo;
use bedrock_cache::Cache;
use bedrock_core::db::DbError;
use bedrock_core::driver::{DriverError, DriverResult};
use log::{error, warn};

mod demo;
mod demos;
#[cfg(test)]
pub(crate) mod testutils;

/// Message reported when the requested demo does not exist.
const DEMO_NOT_FOUND: &str = "demo not found";

/// Returns the cache key that holds the demo with `id`.
fn cache_key(id: i64) -> String {
    format!("demo:{}", id)
}

/// Converts a database error raised while running `op` on demo `id` into a business error.
///
/// Missing demos are an expected outcome, so only other errors are logged.
fn demo_error(e: DbError, op: &str, id: i64) -> DriverError {
    match e {
        DbError::NotFound => DriverError::NotFound(DEMO_NOT_FOUND.to_owned()),
        e => {
            error!("{} failed for demo {}: {}", op, id, e);
            e.into()
        }
    }
}

/// Business logic.
///
/// The public operations exposed by the driver are all "one shot": they start and commit a
/// transaction if they need one, so it's incorrect for the caller to use two separate calls.  For
/// this reason, these operations consume the driver in an attempt to minimize the possibility of
/// executing two operations.
#[derive(Clone)]
pub(crate) struct Driver {
    /// Persistence for demos.
    demos: DemoRepository,

    /// Cache of individual demos, serialized as JSON.
    cache: Cache,
}

impl Driver {
    /// Creates a new driver backed by the given injected components.
    pub(crate) fn new(demos: DemoRepository, cache: Cache) -> Self {
        Self { demos, cache }
    }

    /// Drops the cached copy of demo `id`, if any.
    ///
    /// Failures are logged and otherwise ignored, leaving the stale entry in place until it
    /// expires.
    async fn invalidate(&self, id: i64) {
        if let Err(e) = self.cache.delete(&cache_key(id)).await {
            warn!("Cannot invalidate cached demo {}: {}", id, e);
        }
    }

    /// Reads demo `id` straight from the database.
    async fn fetch(&self, id: i64) -> DriverResult<Demo> {
        let mut ex = self.demos.ex().await.map_err(|e| demo_error(e, "get demo", id))?;
        self.demos.find_by_id(&mut ex, id).await.map_err(|e| demo_error(e, "get demo", id))
    }
}
