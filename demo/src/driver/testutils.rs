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

//! Test utilities for the business layer.

use crate::db::{DemoRepository, init_schema};
use crate::driver::Driver;
use crate::model::*;
use bedrock_cache::Cache;
use bedrock_cache::testutils::memory_cache;
use bedrock_core::clocks::testutils::SettableClock;
use bedrock_core::db::testutils::setup_sqlite;
use bedrock_core::db::{Db, DbResult, Executor};
use std::sync::Arc;
use std::time::Duration;
use time::macros::datetime;

pub(crate) struct TestContext {
    repo: DemoRepository,
    cache: Cache,
    clock: Arc<SettableClock>,
    driver: Driver,
}

impl TestContext {
    pub(crate) async fn setup() -> Self {
        Self::setup_with_cache(memory_cache(Duration::from_secs(300))).await
    }

    pub(crate) async fn setup_with_cache(cache: Cache) -> Self {
        let db = Arc::new(setup_sqlite().await);
        init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let clock = Arc::new(SettableClock::new(datetime!(2024-05-01 08:00:00 UTC)));
        let repo = DemoRepository::new(db, clock.clone());
        let driver = Driver::new(repo.clone(), cache.clone());
        Self { repo, cache, clock, driver }
    }

    pub(crate) fn driver(&self) -> Driver {
        self.driver.clone()
    }

    pub(crate) fn cache(&self) -> &Cache {
        &self.cache
    }

    pub(crate) fn clock(&self) -> &SettableClock {
        &self.clock
    }

    pub(crate) fn repo(&self) -> &DemoRepository {
        &self.repo
    }

    pub(crate) async fn ex(&self) -> Executor {
        self.repo.ex().await.unwrap()
    }

    /// Stores a new demo bypassing the business logic.
    pub(crate) async fn insert(&self, title: &str, content: &str, status: Status) -> Demo {
        let demo = Demo::new(Title::new(title).unwrap(), content.to_owned(), status);
        self.repo.create(&mut self.ex().await, demo).await.unwrap()
    }

    /// Reads a demo bypassing the business logic.
    pub(crate) async fn find(&self, id: i64) -> DbResult<Demo> {
        self.repo.find_by_id(&mut self.ex().await, id).await
    }
}
