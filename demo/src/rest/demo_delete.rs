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

//! API to delete a demo.

use crate::driver::Driver;
use axum::extract::State;
use bedrock_core::rest::{Context, EmptyBody, Envelope, IdPath, RestError};

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    context: Context,
    IdPath(id): IdPath,
    _: EmptyBody,
) -> Result<Envelope<()>, RestError> {
    driver.delete_demo(id).await.map_err(|e| context.fail(e, "delete demo failed"))?;

    Ok(Envelope::ok_with_message("demo deleted successfully", None))
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::rest::testutils::*;
    use axum::http;
    use bedrock_core::db::DbError;
    use bedrock_core::rest::testutils::*;

    fn route(id: i64) -> (http::Method, String) {
        (http::Method::DELETE, format!("/api/v1/demos/{}", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let keep = context.insert("keep", "", Status::ENABLED).await;
        let demo = context.insert("delete", "", Status::ENABLED).await;
        let id = demo.id().unwrap();

        OneShotBuilder::new(context.app(), route(id))
            .send_empty()
            .await
            .expect_message("demo deleted successfully")
            .await;

        assert_eq!(DbError::NotFound, context.find(id).await.unwrap_err());
        assert_eq!(keep, context.find(keep.id().unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(42))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^demo not found$")
            .await;
    }

    test_invalid_id!(TestContext::setup().await.into_app(), http::Method::DELETE, "/api/v1/demos");

    test_payload_must_be_empty!(TestContext::setup().await.into_app(), route(1));
}
