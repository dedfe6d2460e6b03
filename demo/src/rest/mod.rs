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

//! Entry point to the REST server.

use crate::driver::Driver;
use axum::Router;

mod demo_delete;
mod demo_get;
mod demo_put;
mod demo_status_put;
mod demos_get;
mod demos_post;
#[cfg(test)]
mod testutils;

/// Creates the router for the application.
pub(crate) fn app(driver: Driver) -> Router {
    use axum::routing::{get, put};
    Router::new()
        .route("/api/v1/demos", get(demos_get::handler).post(demos_post::handler))
        .route(
            "/api/v1/demos/:id",
            get(demo_get::handler).put(demo_put::handler).delete(demo_delete::handler),
        )
        .route("/api/v1/demos/:id/status", put(demo_status_put::handler))
        .with_state(driver)
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::rest::testutils::*;
    use axum::http;
    use bedrock_core::rest::testutils::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_demo_lifecycle() {
        let context = TestContext::setup().await;

        let created = OneShotBuilder::new(context.app(), (http::Method::POST, "/api/v1/demos"))
            .send_json(json!({"title": "A", "content": "x", "status": 1}))
            .await
            .expect_data::<Demo>()
            .await;
        let id = created.id().unwrap();
        let uri = format!("/api/v1/demos/{}", id);

        let fetched = OneShotBuilder::new(context.app(), (http::Method::GET, &uri))
            .send_empty()
            .await
            .expect_data::<Demo>()
            .await;
        assert_eq!("A", fetched.title().to_string());
        assert_eq!("x", fetched.content());
        assert_eq!(Status::ENABLED, *fetched.status());

        OneShotBuilder::new(context.app(), (http::Method::PUT, &uri))
            .send_json(json!({"title": "B"}))
            .await
            .expect_data::<Demo>()
            .await;

        let fetched = OneShotBuilder::new(context.app(), (http::Method::GET, &uri))
            .send_empty()
            .await
            .expect_data::<Demo>()
            .await;
        assert_eq!("B", fetched.title().to_string());
        assert_eq!("x", fetched.content());

        OneShotBuilder::new(context.app(), (http::Method::DELETE, &uri))
            .send_empty()
            .await
            .expect_message("demo deleted successfully")
            .await;

        OneShotBuilder::new(context.app(), (http::Method::GET, &uri))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^demo not found$")
            .await;
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::GET, "/api/v1/other"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Interface not found$")
            .await;
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::PATCH, "/api/v1/demos/1"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::METHOD_NOT_ALLOWED)
            .expect_error("^Method not allowed$")
            .await;
    }
}
