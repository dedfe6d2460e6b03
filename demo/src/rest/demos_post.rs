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

//! API to create a new demo.

use crate::driver::Driver;
use crate::model::{Demo, Status};
use axum::extract::State;
use bedrock_core::rest::{Context, Envelope, JsonBody, RestError};
use serde::Deserialize;

/// Message body of the request.
#[derive(Deserialize)]
pub(crate) struct CreateRequest {
    /// Title of the new demo.
    title: String,

    /// Content of the new demo.
    #[serde(default)]
    content: String,

    /// Status of the new demo.  Enabled if not given.
    status: Option<i32>,
}

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    context: Context,
    JsonBody(request): JsonBody<CreateRequest>,
) -> Result<Envelope<Demo>, RestError> {
    let status = request.status.map(Status::new).unwrap_or_default();
    let demo = driver
        .create_demo(request.title, request.content, status)
        .await
        .map_err(|e| context.fail(e, "create demo failed"))?;

    Ok(Envelope::ok(demo))
}
