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

//! Operations on one demo.

use crate::driver::{Driver, cache_key, demo_error};
use crate::model::*;
use bedrock_core::driver::{DriverError, DriverResult};
use log::{error, info, warn};
use std::time::Duration;

impl Driver {
    /// Gets the demo with `id`, going through the cache.
    pub(crate) async fn get_demo(self, id: i64) -> DriverResult<Demo> {
        let key = cache_key(id);
        let driver = &self;
        let json = self
            .cache
            .remember(&key, Duration::ZERO, || async move {
                let demo = driver.fetch(id).await?;
                serde_json::to_string(&demo).map_err(|e| {
                    DriverError::BackendError(format!("Cannot serialize demo {}: {}", id, e))
                })
            })
            .await?;

        match serde_json::from_str(&json) {
            Ok(demo) => Ok(demo),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                self.invalidate(id).await;
                self.fetch(id).await
            }
        }
    }

    /// Creates a new demo.
    pub(crate) async fn create_demo(
        self,
        title: String,
        content: String,
        status: Status,
    ) -> DriverResult<Demo> {
        let title = Title::new(title)?;

        let mut ex = self.demos.ex().await?;
        let demo = Demo::new(title, content, status);
        let demo = self.demos.create(&mut ex, demo.clone()).await.map_err(|e| {
            error!("create demo failed for title '{}': {}", demo.title(), e);
            e
        })?;

        info!("Created demo {} titled '{}'", demo.id().unwrap_or_default(), demo.title());
        Ok(demo)
    }

    /// Replaces the title of demo `id` and, if given, its `content` and `status`.
    pub(crate) async fn update_demo(
        self,
        id: i64,
        title: String,
        content: Option<String>,
        status: Option<Status>,
    ) -> DriverResult<Demo> {
        let title = Title::new(title)?;

        let demos = self.demos.clone();
        let demo = self
            .demos
            .transaction(move |ex| {
                Box::pin(async move {
                    let existing = demos.find_by_id(ex, id).await?;
                    let content = content.unwrap_or_else(|| existing.content().clone());
                    let status = status.unwrap_or(*existing.status());
                    demos.update(ex, existing.with_fields(title, content, status)).await
                })
            })
            .await
            .map_err(|e| demo_error(e, "update demo", id))?;
        self.invalidate(id).await;

        info!("Updated demo {}", id);
        Ok(demo)
    }

    /// Sets the `status` of demo `id`.
    pub(crate) async fn update_demo_status(self, id: i64, status: Status) -> DriverResult<()> {
        let mut ex = self.demos.ex().await?;
        self.demos
            .update_status(&mut ex, id, status)
            .await
            .map_err(|e| demo_error(e, "update demo status", id))?;
        drop(ex);
        self.invalidate(id).await;

        info!("Set status of demo {} to {}", id, status);
        Ok(())
    }

    /// Deletes demo `id`.
    pub(crate) async fn delete_demo(self, id: i64) -> DriverResult<()> {
        let mut ex = self.demos.ex().await?;
        self.demos.delete(&mut ex, id).await.map_err(|e| demo_error(e, "delete demo", id))?;
        drop(ex);
        self.invalidate(id).await;

        info!("Deleted demo {}", id);
        Ok(())
    }
}
