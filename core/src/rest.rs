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

//! Generic code for REST handlers.
//!
//! All services should implement an `app` function in their `rest` module that returns the
//! `Router` for the application, and then pass it through `wrap` to get the common fallbacks and
//! middleware.
//!
//! Every API should be put in its own `.rs` file, using a name like `<entity>_<method>.rs`.  This
//! may seem overkill, but putting every API in its own file makes it easy to ensure all the
//! integration tests for the given API truly belong to that API.
//!
//! More specifically, the `tests` module within an API should define a `route` method that
//! returns the HTTP method and the API path under test.  All integration tests within the module
//! then rely on `route` to obtain this information, ensuring that they all test the desired API.
//!
//! It is also useful for the tests in this layer to define a `TestContext` in a `testutils` module
//! that allows interacting with the database layer directly, using simplified types.
//!
//! Every response, successful or not, is an `Envelope`.

use crate::config::{CorsSettings, ServerSettings};
use crate::driver::DriverError;
use crate::model::ModelError;
use crate::security::SecurityError;
use axum::Router;
use axum::http::header::AsHeaderName;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;

mod context;
pub use context::{Context, RequestId};
mod envelope;
pub use envelope::Envelope;
mod extract;
pub use extract::{EmptyBody, IdPath, JsonBody, QueryParams};
mod handlers;
pub use handlers::{health, method_not_allowed, not_found, request_timeout};
mod middleware;
pub use middleware::{REQUEST_ID_HEADER, access_log, cors, request_id, with_request_id};

/// Frontend errors.  These are the errors that are visible to the user on failed requests.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RestError {
    /// Indicates an authorization problem.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Catch-all error type for all unexpected errors.
    #[error("{0}")]
    InternalError(String),

    /// Indicates an error in the contents of the request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Indicates that the route exists but not for the requested method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Indicates that a requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Indicates that a request that should have empty content did not.
    #[error("Content should be empty")]
    PayloadNotEmpty,

    /// Indicates that the request did not complete within the configured time.
    #[error("Request timed out")]
    RequestTimeout,

    /// Indicates an authentication problem.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl RestError {
    /// Returns the HTTP status code that represents this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::Forbidden(_) => StatusCode::FORBIDDEN,
            RestError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RestError::NotFound(_) => StatusCode::NOT_FOUND,
            RestError::PayloadNotEmpty => StatusCode::PAYLOAD_TOO_LARGE,
            RestError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            RestError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<DriverError> for RestError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::AlreadyExists(_) => RestError::InvalidRequest(e.to_string()),
            DriverError::BackendError(_) => RestError::InternalError(e.to_string()),
            DriverError::InvalidInput(_) => RestError::InvalidRequest(e.to_string()),
            DriverError::NotFound(_) => RestError::NotFound(e.to_string()),
            DriverError::Unauthorized(_) => RestError::Forbidden(e.to_string()),
        }
    }
}

impl From<ModelError> for RestError {
    fn from(e: ModelError) -> Self {
        RestError::InvalidRequest(e.to_string())
    }
}

impl From<SecurityError> for RestError {
    fn from(e: SecurityError) -> Self {
        RestError::Unauthorized(e.to_string())
    }
}

impl From<serde_json::Error> for RestError {
    fn from(e: serde_json::Error) -> Self {
        RestError::InvalidRequest(e.to_string())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> axum::response::Response {
        Envelope::<()>::error(self.status(), self.to_string()).into_response()
    }
}

/// Result type for this module.
pub type RestResult<T> = Result<T, RestError>;

/// Extracts the header `name` from `headers` and ensures it has at most one value.
pub fn get_unique_header<K: AsHeaderName + Copy>(
    headers: &HeaderMap,
    name: K,
) -> RestResult<Option<&HeaderValue>> {
    let mut iter = headers.get_all(name).iter();
    let value = iter.next();
    if iter.next().is_some() {
        return Err(RestError::InvalidRequest(format!(
            "Header {} cannot have more than one value",
            name.as_str()
        )));
    }
    Ok(value)
}

/// Wraps the service-specific `app` with the fallbacks and middleware common to all services.
///
/// Layers run in this order for every request: request ID, access log, panic recovery, CORS,
/// timeout and, finally, the handler.  The `/health` route is added here too.
pub fn wrap(app: Router, server: &ServerSettings, cors_settings: &CorsSettings) -> Router {
    use axum::middleware::{from_fn, from_fn_with_state, map_response};
    use axum::routing::get;

    let mut router = app
        .route("/health", get(health))
        .fallback(not_found)
        .layer(map_response(method_not_allowed))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            server.request_timeout(),
        ))
        .layer(map_response(request_timeout));
    if cors_settings.enabled {
        router = router.layer(from_fn_with_state(Arc::new(cors_settings.clone()), cors));
    }
    let router = router
        .layer(CatchPanicLayer::custom(|_panic: Box<dyn std::any::Any + Send + 'static>| {
            RestError::InternalError("Internal server error".to_owned()).into_response()
        }))
        .layer(from_fn(access_log));
    with_request_id(router)
}

/// Common test code for the REST server.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use axum::http::{self, HeaderName};
    use axum::extract::Request;
    use bytes::Bytes;
    use serde::Serialize;
    use serde::de::DeserializeOwned;
    use tower::util::ServiceExt;

    /// Maximum body size for testing purposes.
    const MAX_BODY_SIZE: usize = 64 * 1024;

    /// Builder for a single request to the API server.
    #[must_use]
    pub struct OneShotBuilder {
        /// The router for the app being tested.
        app: Router,

        /// Builder for the request that will be sent to the app.
        builder: axum::http::request::Builder,
    }

    impl OneShotBuilder {
        /// Creates a new request against a given `method`/`uri` pair served by an `app` router.
        pub fn new<U: AsRef<str>>(app: Router, (method, uri): (http::Method, U)) -> Self {
            let builder = Request::builder().method(method).uri(uri.as_ref());
            Self { app, builder }
        }

        /// Extends the URI in the request with a `query`.
        pub fn with_query<Q: Serialize>(mut self, query: Q) -> Self {
            let uri = self.builder.uri_ref().unwrap().to_string();
            assert!(!uri.contains('?'), "URI already contains a query: {}", uri);
            self.builder = self.builder.uri(format!(
                "{}?{}",
                uri,
                serde_urlencoded::to_string(query).unwrap()
            ));
            self
        }

        /// Sets the header `name` to `value` in the outgoing request.
        pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
        where
            HeaderName: TryFrom<K>,
            <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
            HeaderValue: TryFrom<V>,
            <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
        {
            self.builder = self.builder.header(name, value);
            self
        }

        /// Finishes building the request and sends it with an empty payload.
        pub async fn send_empty(self) -> ResponseChecker {
            let request = self.builder.body(axum::body::Body::empty()).unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a binary payload.
        pub async fn send_bytes(self, bytes: Bytes) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())
                .body(axum::body::Body::from(bytes))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a text payload.
        pub async fn send_text<T: Into<String>>(self, text: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
                .body(axum::body::Body::from(text.into()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a JSON payload.
        pub async fn send_json<T: Serialize>(self, request: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(axum::body::Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }
    }

    /// Type alias for the complex type returned by the `oneshot` function.
    type HttpResponse = hyper::Response<axum::body::Body>;

    /// Validator for the outcome of a request sent by a `OneShotBuilder`.
    #[must_use]
    pub struct ResponseChecker {
        /// Actual response that we received from the app.
        response: HttpResponse,

        /// Expected HTTP status code in the response above.
        exp_status: http::StatusCode,
    }

    impl From<HttpResponse> for ResponseChecker {
        fn from(response: HttpResponse) -> Self {
            Self { response, exp_status: http::StatusCode::OK }
        }
    }

    impl ResponseChecker {
        /// Sets the expected exit HTTP status to `status`.
        pub fn expect_status(mut self, status: http::StatusCode) -> Self {
            self.exp_status = status;
            self
        }

        /// Performs common validation operations on the response.
        pub fn verify(&self) {
            assert_eq!(self.exp_status, self.response.status());
        }

        /// Consumes the response and returns its body.
        async fn take_body(self) -> Bytes {
            self.verify();
            axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap()
        }

        /// Finishes checking the response and expects it to contain an empty body.
        pub async fn expect_empty(self) {
            let body = self.take_body().await;
            let body = String::from_utf8(body.to_vec()).unwrap();
            assert!(body.is_empty(), "Body not empty; got {}", body);
        }

        /// Finishes checking the response and returns the envelope in its body, after validating
        /// that its `code` mirrors the HTTP status.
        pub async fn expect_envelope<T: DeserializeOwned>(self) -> Envelope<T> {
            let exp_code = self.exp_status.as_u16();
            let body = self.take_body().await;
            let envelope: Envelope<T> = match serde_json::from_slice(&body) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let body = String::from_utf8(body.to_vec()).unwrap();
                    panic!("Invalid envelope due to {}; content was {}", e, body);
                }
            };
            assert_eq!(exp_code, envelope.code);
            envelope
        }

        /// Finishes checking the response and expects its body to be an error envelope whose
        /// message matches `exp_re`.
        pub async fn expect_error(self, exp_re: &str) {
            let envelope = self.expect_envelope::<serde_json::Value>().await;
            assert!(envelope.data.is_none(), "Error envelope carries data: {:?}", envelope);
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(
                re.is_match(&envelope.message),
                "Response message '{}' does not match re '{}'",
                envelope.message,
                exp_re
            );
        }

        /// Finishes checking the response and expects it to be a successful envelope with a `data`
        /// payload of type `T`, which is returned.
        pub async fn expect_data<T: DeserializeOwned>(self) -> T {
            let envelope = self.expect_envelope::<T>().await;
            match envelope.data {
                Some(data) => data,
                None => panic!("Envelope '{}' carries no data", envelope.message),
            }
        }

        /// Finishes checking the response and expects it to be a successful envelope without data
        /// whose message is exactly `exp_message`.
        pub async fn expect_message(self, exp_message: &str) {
            let envelope = self.expect_envelope::<serde_json::Value>().await;
            assert_eq!(exp_message, envelope.message);
            assert!(envelope.data.is_none(), "Envelope carries data: {:?}", envelope);
        }

        /// Finishes checking the response and returns the response itself for out of band
        /// validation of properties not supported by the `ResponseChecker`.
        pub async fn take_response(self) -> HttpResponse {
            self.verify();

            self.response
        }
    }

    /// Generates a test to verify that an API that expects JSON fails when it gets something else.
    #[macro_export]
    macro_rules! test_payload_must_be_json {
        ( $app:expr, $route:expr $(, $query:expr)? ) => {
            #[tokio::test]
            async fn test_payload_must_be_json() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    $( .with_query($query) )?
                    .send_text("this is not json")
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("Content-Type")
                    .await;

                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    $( .with_query($query) )?
                    .with_header(axum::http::header::CONTENT_TYPE, "application/json")
                    .send_text("this is not json")
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("^invalid request: ")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_json;

    /// Generates a test to verify that an API that does not expect a payload fails as necessary.
    #[macro_export]
    macro_rules! test_payload_must_be_empty {
        ( $app:expr, $route:expr $(, $query:expr)? ) => {
            #[tokio::test]
            async fn test_payload_must_be_empty() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    $( .with_query($query) )?
                    .send_text("should not be here")
                    .await
                    .expect_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE)
                    .expect_error("should be empty")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_empty;

    /// Generates a test to verify that an API rejects identifiers that are not positive integers.
    #[macro_export]
    macro_rules! test_invalid_id {
        ( $app:expr, $method:expr, $prefix:expr ) => {
            #[tokio::test]
            async fn test_invalid_id() {
                for id in ["abc", "0", "-3", "1.5"] {
                    $crate::rest::testutils::OneShotBuilder::new(
                        $app,
                        ($method, format!("{}/{}", $prefix, id)),
                    )
                    .send_empty()
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("^invalid id$")
                    .await;
                }
            }
        };
    }

    pub use test_invalid_id;
}

#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use axum::routing::get;
    use std::time::Duration;

    #[test]
    fn test_get_unique_header_missing() {
        let mut headers = HeaderMap::new();
        headers.append("ignore-me", "ignored".parse().unwrap());
        assert!(get_unique_header(&headers, "the-header").unwrap().is_none());
    }

    #[test]
    fn test_get_unique_header_one() {
        let mut headers = HeaderMap::new();
        headers.append("ignore-me", "ignored".parse().unwrap());
        headers.append("the-header", "foo".parse().unwrap());
        assert_eq!(b"foo", get_unique_header(&headers, "the-header").unwrap().unwrap().as_bytes());
    }

    #[test]
    fn test_get_unique_header_many() {
        let mut headers = HeaderMap::new();
        headers.append("the-header", "foo".parse().unwrap());
        headers.append("ignore-me", "ignored".parse().unwrap());
        headers.append("The-Header", "bar".parse().unwrap());
        assert_eq!(
            RestError::InvalidRequest(
                "Header the-header cannot have more than one value".to_owned()
            ),
            get_unique_header(&headers, "the-header").unwrap_err()
        );
    }

    #[test]
    fn test_driver_error_mapping() {
        assert_eq!(
            RestError::NotFound("demo not found".to_owned()),
            DriverError::NotFound("demo not found".to_owned()).into()
        );
        assert_eq!(
            RestError::InvalidRequest("bad".to_owned()),
            DriverError::InvalidInput("bad".to_owned()).into()
        );
        assert_eq!(
            RestError::InternalError("boom".to_owned()),
            DriverError::BackendError("boom".to_owned()).into()
        );
        assert_eq!(
            RestError::Forbidden("nope".to_owned()),
            DriverError::Unauthorized("nope".to_owned()).into()
        );
    }

    /// Builds a wrapped router with a few routes to exercise the common behavior.
    fn app(cors: CorsSettings) -> Router {
        async fn panics() -> &'static str {
            panic!("Handler exploded");
        }

        async fn sleeps() -> &'static str {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "done"
        }

        let server = ServerSettings { request_timeout_secs: 1, ..Default::default() };
        let app = Router::new()
            .route("/things", get(|| async { Envelope::ok(vec![1, 2, 3]) }))
            .route("/panic", get(panics))
            .route("/slow", get(sleeps));
        wrap(app, &server, &cors)
    }

    #[tokio::test]
    async fn test_wrap_health() {
        #[derive(serde::Deserialize)]
        struct Health {
            status: String,
        }

        let route = (http::Method::GET, "/health");
        let health = OneShotBuilder::new(app(CorsSettings::default()), route)
            .send_empty()
            .await
            .expect_data::<Health>()
            .await;
        assert_eq!("ok", health.status);
    }

    #[tokio::test]
    async fn test_wrap_success_envelope() {
        let envelope =
            OneShotBuilder::new(app(CorsSettings::default()), (http::Method::GET, "/things"))
                .send_empty()
                .await
                .expect_envelope::<Vec<i32>>()
                .await;
        assert_eq!("success", envelope.message);
        assert_eq!(Some(vec![1, 2, 3]), envelope.data);
    }

    #[tokio::test]
    async fn test_wrap_not_found() {
        OneShotBuilder::new(app(CorsSettings::default()), (http::Method::GET, "/nothing/here"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Interface not found$")
            .await;
    }

    #[tokio::test]
    async fn test_wrap_method_not_allowed() {
        OneShotBuilder::new(app(CorsSettings::default()), (http::Method::DELETE, "/things"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::METHOD_NOT_ALLOWED)
            .expect_error("^Method not allowed$")
            .await;
    }

    #[tokio::test]
    async fn test_wrap_panic_recovery() {
        OneShotBuilder::new(app(CorsSettings::default()), (http::Method::GET, "/panic"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::INTERNAL_SERVER_ERROR)
            .expect_error("^Internal server error$")
            .await;
    }

    #[tokio::test]
    async fn test_wrap_panic_keeps_request_id() {
        let route = (http::Method::GET, "/panic");
        let response = OneShotBuilder::new(app(CorsSettings::default()), route)
            .with_header(REQUEST_ID_HEADER, "panic-1")
            .send_empty()
            .await
            .expect_status(http::StatusCode::INTERNAL_SERVER_ERROR)
            .take_response()
            .await;
        assert_eq!("panic-1", response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_timeout() {
        let route = (http::Method::GET, "/slow");
        OneShotBuilder::new(app(CorsSettings::default()), route)
            .send_empty()
            .await
            .expect_status(http::StatusCode::REQUEST_TIMEOUT)
            .expect_error("^Request timed out$")
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_timeout_keeps_request_id() {
        let route = (http::Method::GET, "/slow");
        let response = OneShotBuilder::new(app(CorsSettings::default()), route)
            .with_header(REQUEST_ID_HEADER, "slow-1")
            .send_empty()
            .await
            .expect_status(http::StatusCode::REQUEST_TIMEOUT)
            .take_response()
            .await;
        assert_eq!("slow-1", response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap());
    }

    #[tokio::test]
    async fn test_wrap_handler_timeout_envelope_untouched() {
        async fn gives_up() -> RestError {
            RestError::RequestTimeout
        }

        let app = wrap(
            Router::new().route("/gives-up", get(gives_up)),
            &ServerSettings::default(),
            &CorsSettings::default(),
        );
        OneShotBuilder::new(app, (http::Method::GET, "/gives-up"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::REQUEST_TIMEOUT)
            .expect_error("^Request timed out$")
            .await;
    }

    #[tokio::test]
    async fn test_wrap_request_id_on_errors() {
        let response =
            OneShotBuilder::new(app(CorsSettings::default()), (http::Method::GET, "/nothing"))
                .with_header(REQUEST_ID_HEADER, "abc-123")
                .send_empty()
                .await
                .expect_status(http::StatusCode::NOT_FOUND)
                .take_response()
                .await;
        assert_eq!(
            "abc-123",
            response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap()
        );
    }

    #[tokio::test]
    async fn test_wrap_cors_disabled() {
        let cors = CorsSettings { enabled: false, ..Default::default() };
        let response = OneShotBuilder::new(app(cors), (http::Method::GET, "/things"))
            .with_header(http::header::ORIGIN, "https://example.com")
            .send_empty()
            .await
            .take_response()
            .await;
        assert!(!response.headers().contains_key(http::header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
