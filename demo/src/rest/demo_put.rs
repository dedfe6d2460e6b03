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

//! API to update a demo.

use crate::driver::Driver;
use crate::model::{Demo, Status};
use axum::extract::State;
use bedrock_core::rest::{Context, Envelope, IdPath, JsonBody, RestError};
use serde::Deserialize;

/// Message returned on success.
const UPDATED: &str = "demo updated successfully";

/// Message body of the request.
#[derive(Deserialize)]
pub(crate) struct UpdateRequest {
    /// New title of the demo.
    title: String,

    /// New content of the demo, or `None` to keep the current one.
    content: Option<String>,

    /// New status of the demo, or `None` to keep the current one.
    status: Option<i32>,
}

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    context: Context,
    IdPath(id): IdPath,
    JsonBody(request): JsonBody<UpdateRequest>,
) -> Result<Envelope<Demo>, RestError> {
    let demo = driver
        .update_demo(id, request.title, request.content, request.status.map(Status::new))
        .await
        .map_err(|e| context.fail(e, "update demo failed"))?;

    Ok(Envelope::ok_with_message(UPDATED, Some(demo)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use bedrock_core::rest::testutils::*;
    use serde_json::json;

    fn route(id: i64) -> (http::Method, String) {
        (http::Method::PUT, format!("/api/v1/demos/{}", id))
    }

    #[tokio::test]
    async fn test_all_fields() {
        let context = TestContext::setup().await;

        let demo = context.insert("old", "old content", Status::ENABLED).await;
        let id = demo.id().unwrap();

        let response = OneShotBuilder::new(context.app(), route(id))
            .send_json(json!({"title": "new", "content": "new content", "status": 0}))
            .await
            .expect_envelope::<Demo>()
            .await;
        assert_eq!(UPDATED, response.message);
        let updated = response.data.unwrap();
        assert_eq!(Some(id), updated.id());
        assert_eq!("new", updated.title().to_string());
        assert_eq!("new content", updated.content());
        assert_eq!(Status::DISABLED, *updated.status());

        assert_eq!(updated, context.find(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_title_only() {
        let context = TestContext::setup().await;

        let demo = context.insert("old", "old content", Status::DISABLED).await;
        let id = demo.id().unwrap();

        OneShotBuilder::new(context.app(), route(id))
            .send_json(json!({"title": "new"}))
            .await
            .expect_data::<Demo>()
            .await;

        let stored = context.find(id).await.unwrap();
        assert_eq!("new", stored.title().to_string());
        assert_eq!("old content", stored.content());
        assert_eq!(Status::DISABLED, *stored.status());
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(42))
            .send_json(json!({"title": "new"}))
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^demo not found$")
            .await;
    }

    #[tokio::test]
    async fn test_missing_title() {
        let context = TestContext::setup().await;

        let demo = context.insert("old", "", Status::ENABLED).await;

        OneShotBuilder::new(context.app(), route(demo.id().unwrap()))
            .send_json(json!({"content": "new content"}))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("^invalid request: .*title")
            .await;
    }

    #[tokio::test]
    async fn test_empty_title() {
        let context = TestContext::setup().await;

        let demo = context.insert("old", "", Status::ENABLED).await;
        let id = demo.id().unwrap();

        OneShotBuilder::new(context.app(), route(id))
            .send_json(json!({"title": ""}))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("^title cannot be empty$")
            .await;

        assert_eq!(demo, context.find(id).await.unwrap());
    }

    test_invalid_id!(TestContext::setup().await.into_app(), http::Method::PUT, "/api/v1/demos");

    test_payload_must_be_json!(TestContext::setup().await.into_app(), route(1));
}
