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

//! Test utilities for the REST API.

use crate::driver::testutils::TestContext as DriverTestContext;
use crate::model::*;
use crate::rest::app;
use axum::Router;
use bedrock_core::config::{CorsSettings, ServerSettings};
use bedrock_core::db::DbResult;
use bedrock_core::rest::wrap;

pub(crate) struct TestContext {
    driver: DriverTestContext,
    app: Router,
}

impl TestContext {
    pub(crate) async fn setup() -> Self {
        let driver = DriverTestContext::setup().await;
        let app =
            wrap(app(driver.driver()), &ServerSettings::default(), &CorsSettings::default());
        Self { driver, app }
    }

    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    pub(crate) fn into_app(self) -> Router {
        self.app
    }

    pub(crate) async fn insert(&self, title: &str, content: &str, status: Status) -> Demo {
        self.driver.insert(title, content, status).await
    }

    pub(crate) async fn find(&self, id: i64) -> DbResult<Demo> {
        self.driver.find(id).await
    }
}
