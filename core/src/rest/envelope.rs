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

//! The uniform response wrapper.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Message carried by successful responses unless the handler provides its own.
const SUCCESS: &str = "success";

/// Body of every response: an application-level `code` mirroring the HTTP status, a
/// human-readable `message` and an optional `data` payload.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct Envelope<T> {
    /// Application-level status code.
    pub code: u16,

    /// Human-readable description of the outcome.
    pub message: String,

    /// Payload of successful responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Builds a successful envelope with `data`.
    pub fn ok(data: T) -> Self {
        Self { code: StatusCode::OK.as_u16(), message: SUCCESS.to_owned(), data: Some(data) }
    }

    /// Builds a successful envelope with a custom `message` and optional `data`.
    pub fn ok_with_message<M: Into<String>>(message: M, data: Option<T>) -> Self {
        Self { code: StatusCode::OK.as_u16(), message: message.into(), data }
    }
}

impl Envelope<()> {
    /// Builds an error envelope for `status`.
    pub fn error<M: Into<String>>(status: StatusCode, message: M) -> Self {
        Self { code: status.as_u16(), message: message.into(), data: None }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_serialization() {
        let envelope = Envelope::ok(json!({"id": 3}));
        assert_eq!(
            json!({"code": 200, "message": "success", "data": {"id": 3}}),
            serde_json::to_value(&envelope).unwrap()
        );
    }

    #[test]
    fn test_data_omitted_when_absent() {
        let envelope = Envelope::<()>::ok_with_message("demo deleted successfully", None);
        assert_eq!(
            json!({"code": 200, "message": "demo deleted successfully"}),
            serde_json::to_value(&envelope).unwrap()
        );

        let envelope = Envelope::error(StatusCode::NOT_FOUND, "demo not found");
        assert_eq!(
            json!({"code": 404, "message": "demo not found"}),
            serde_json::to_value(&envelope).unwrap()
        );
    }

    #[test]
    fn test_deserialize_without_data() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Item {
            id: i64,
        }

        let envelope: Envelope<Item> =
            serde_json::from_value(json!({"code": 404, "message": "demo not found"})).unwrap();
        assert_eq!(None, envelope.data);

        let envelope: Envelope<Item> =
            serde_json::from_value(json!({"code": 200, "message": "success", "data": {"id": 3}}))
                .unwrap();
        assert_eq!(Some(Item { id: 3 }), envelope.data);
    }

    #[test]
    fn test_into_response_status() {
        assert_eq!(StatusCode::OK, Envelope::ok(1).into_response().status());
        assert_eq!(
            StatusCode::BAD_REQUEST,
            Envelope::error(StatusCode::BAD_REQUEST, "x").into_response().status()
        );
        let bogus = Envelope::<()> { code: 5, message: "x".to_owned(), data: None };
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, bogus.into_response().status());
    }
}
