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

//! Default handlers shared by all services.

use crate::rest::{Envelope, RestError};
use axum::body::HttpBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Payload of the health check.
#[derive(Serialize)]
pub struct Health {
    /// Always `ok` while the process can serve requests.
    status: &'static str,
}

/// Reports that the service is alive.
pub async fn health() -> Envelope<Health> {
    Envelope::ok(Health { status: "ok" })
}

/// Fallback for routes that do not exist.
pub async fn not_found() -> RestError {
    RestError::NotFound("Interface not found".to_owned())
}

/// Rewrites the bare `405` responses produced by the router into envelopes, keeping the `Allow`
/// header.
pub async fn method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }
    let (parts, _body) = response.into_parts();
    let mut rewritten = RestError::MethodNotAllowed.into_response();
    if let Some(allow) = parts.headers.get(axum::http::header::ALLOW) {
        rewritten.headers_mut().insert(axum::http::header::ALLOW, allow.clone());
    }
    rewritten
}

/// Rewrites the empty `408` responses produced by the timeout layer into envelopes.
///
/// Responses that already carry a body, such as those built from `RestError`, pass through.
pub async fn request_timeout(response: Response) -> Response {
    let empty = response.body().size_hint().exact() == Some(0);
    if response.status() != StatusCode::REQUEST_TIMEOUT || !empty {
        return response;
    }
    RestError::RequestTimeout.into_response()
}
