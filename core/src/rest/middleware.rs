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

//! Middleware shared by all services.

use crate::config::CorsSettings;
use crate::rest::{RequestId, get_unique_header};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use uuid::Uuid;

/// Header carrying the request identifier in both directions.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Seconds that browsers may cache a preflight response for.
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Stores the request identifier in the request extensions as a `RequestId`.
///
/// Requests carrying more than one `X-Request-ID` header are rejected.  Requests with a missing
/// or empty header get a fresh identifier, which is echoed in the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let provided = match get_unique_header(req.headers(), REQUEST_ID_HEADER) {
        Ok(value) => {
            value.and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty()).map(str::to_owned)
        }
        Err(e) => return e.into_response(),
    };
    let (id, generated) = match provided {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(req).await;
    if generated {
        match HeaderValue::from_str(&id) {
            Ok(value) => {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            Err(e) => warn!("Cannot echo request id: {}", e),
        }
    }
    response
}

/// Wraps `router` so that every request has an identifier that is echoed in its response.
///
/// Identifiers are assigned and propagated by `tower_http`.  The inner `request_id` layer
/// validates them and exposes them to the handlers.
pub fn with_request_id(router: Router) -> Router {
    let name = HeaderName::from_static("x-request-id");
    router
        .layer(from_fn(request_id))
        .layer(PropagateRequestIdLayer::new(name.clone()))
        .layer(SetRequestIdLayer::new(name, MakeRequestUuid))
}

/// Logs one line per request with its outcome and latency.
pub async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let request_id = match req.extensions().get::<RequestId>() {
        Some(id) => id.0.clone(),
        None => "-".to_owned(),
    };

    let start = Instant::now();
    let response = next.run(req).await;
    info!(
        "[{}] {} {} {} {}us",
        request_id,
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_micros()
    );
    response
}

/// Computes the value of `Access-Control-Allow-Origin` for a request from `origin`, if any.
fn allowed_origin(settings: &CorsSettings, origin: Option<&str>) -> Option<String> {
    if let Some(origin) = origin.filter(|o| !o.is_empty()) {
        if settings.allow_origins.iter().any(|allowed| allowed == "*" || allowed == origin) {
            return Some(origin.to_owned());
        }
    }
    if settings.allow_origins.len() == 1 && settings.allow_origins[0] == "*" {
        return Some("*".to_owned());
    }
    None
}

/// Adds cross-origin headers to responses and answers preflight requests.
///
/// `OPTIONS` requests never reach the handlers: they get an empty `204` response.
pub async fn cors(State(settings): State<Arc<CorsSettings>>, req: Request, next: Next) -> Response {
    let origin = req.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let allow_origin = allowed_origin(&settings, origin);

    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    if let Some(allow_origin) = allow_origin {
        let credentials = allow_origin != "*";
        match HeaderValue::from_str(&allow_origin) {
            Ok(value) => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                if credentials {
                    headers.insert(
                        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                        HeaderValue::from_static("true"),
                    );
                    headers.append(header::VARY, HeaderValue::from_static("Origin"));
                }
            }
            Err(e) => warn!("Cannot echo origin {}: {}", allow_origin, e),
        }
    }
    for (name, values) in [
        (header::ACCESS_CONTROL_ALLOW_METHODS, &settings.allow_methods),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, &settings.allow_headers),
    ] {
        match HeaderValue::from_str(&values.join(", ")) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(e) => warn!("Invalid CORS configuration for {}: {}", name, e),
        }
    }
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));
    response
}
