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

//! API to enable or disable a demo.

use crate::driver::Driver;
use crate::model::Status;
use axum::extract::State;
use bedrock_core::rest::{Context, Envelope, IdPath, JsonBody, RestError};
use serde::Deserialize;

/// Message body of the request.
#[derive(Deserialize)]
pub(crate) struct StatusRequest {
    /// New status of the demo.
    status: i32,
}

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    context: Context,
    IdPath(id): IdPath,
    JsonBody(request): JsonBody<StatusRequest>,
) -> Result<Envelope<()>, RestError> {
    driver
        .update_demo_status(id, Status::new(request.status))
        .await
        .map_err(|e| context.fail(e, "update demo status failed"))?;

    Ok(Envelope::ok_with_message("demo status updated successfully", None))
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::rest::testutils::*;
    use axum::http;
    use bedrock_core::rest::testutils::*;
    use serde_json::json;

    fn route(id: i64) -> (http::Method, String) {
        (http::Method::PUT, format!("/api/v1/demos/{}/status", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let demo = context.insert("the demo", "text", Status::ENABLED).await;
        let id = demo.id().unwrap();

        OneShotBuilder::new(context.app(), route(id))
            .send_json(json!({"status": 0}))
            .await
            .expect_message("demo status updated successfully")
            .await;

        let stored = context.find(id).await.unwrap();
        assert_eq!(Status::DISABLED, *stored.status());
        assert_eq!("the demo", stored.title().to_string());
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(42))
            .send_json(json!({"status": 0}))
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^demo not found$")
            .await;
    }

    #[tokio::test]
    async fn test_missing_status() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(1))
            .send_json(json!({}))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("^invalid request: .*status")
            .await;
    }

    test_payload_must_be_json!(TestContext::setup().await.into_app(), route(1));
}
